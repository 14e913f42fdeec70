//! Generation backend configuration from TOML (`[generation]` section)

use crew_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};

/// Environment variable consulted when no API key is configured
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Raw generation configuration from TOML
///
/// # Example
///
/// ```toml
/// [generation]
/// provider = "gemini"
/// model = "gemini-2.5-pro"
/// temperature = 0.1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileGenerationConfig {
    /// Backend name; only "gemini" is supported
    pub provider: String,
    pub model: String,
    /// Falls back to `GEMINI_API_KEY` when unset
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub base_url: String,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for FileGenerationConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-pro".to_string(),
            api_key: None,
            temperature: 0.1,
            max_output_tokens: 8192,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl FileGenerationConfig {
    /// API key from the config file, or from the environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(GEMINI_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if !self.provider.eq_ignore_ascii_case("gemini") {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::UnknownBackend,
                format!(
                    "generation.provider: unknown backend '{}', expected 'gemini'",
                    self.provider
                ),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::OutOfRange,
                format!(
                    "generation.temperature: {} is outside [0, 2]",
                    self.temperature
                ),
            ));
        }
        if self.model.trim().is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::OutOfRange,
                "generation.model must not be empty",
            ));
        }
        if self.resolve_api_key().is_none() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::MissingCredential,
                format!(
                    "generation.api_key is not set (set it in the config file or export {})",
                    GEMINI_API_KEY_ENV
                ),
            ));
        }

        issues
    }
}
