//! Literature search configuration from TOML (`[literature]` section)

use crew_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};

/// Raw literature configuration from TOML
///
/// # Example
///
/// ```toml
/// [literature]
/// enabled = true
/// email = "clinic@example.org"   # NCBI asks every client for a contact
/// max_results = 5
/// required = false               # fail an expert when the search fails
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLiteratureConfig {
    pub enabled: bool,
    /// E-utilities base URL
    pub base_url: String,
    pub email: Option<String>,
    pub api_key: Option<String>,
    /// Tool name reported to NCBI
    pub tool: String,
    pub max_results: usize,
    pub required: bool,
    pub request_timeout_secs: u64,
}

impl Default for FileLiteratureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            email: None,
            api_key: None,
            tool: "ClinicalCrew".to_string(),
            max_results: 5,
            required: false,
            request_timeout_secs: 30,
        }
    }
}

impl FileLiteratureConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if !self.enabled {
            return issues;
        }
        if self.email.as_deref().is_none_or(|e| e.trim().is_empty()) {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::MissingCredential,
                "literature.email is not set; NCBI may throttle anonymous clients",
            ));
        }
        if self.max_results == 0 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::OutOfRange,
                "literature.max_results is 0; searches will return nothing",
            ));
        }
        issues
    }
}
