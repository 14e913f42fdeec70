//! Expert roster from TOML (`[[experts]]` tables)

use crew_domain::{ConfigIssue, ConfigIssueCode, ExpertId, ExpertProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One configured expert
///
/// # Example
///
/// ```toml
/// [[experts]]
/// id = "nephrology"
/// display_name = "Nephrology"
/// system_instruction = "You are a consultant nephrologist."
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileExpertConfig {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub system_instruction: Option<String>,
}

impl FileExpertConfig {
    fn to_profile(&self) -> ExpertProfile {
        let id = ExpertId::new(&self.id);
        let display_name = self
            .display_name
            .clone()
            .unwrap_or_else(|| self.id.trim().to_string());
        let instruction = self
            .system_instruction
            .clone()
            .unwrap_or_else(|| format!("You are a consultant in {}.", display_name));
        ExpertProfile::new(id, display_name, instruction)
    }
}

/// Build the roster; an empty list means the built-in roster.
///
/// Entries with an empty id and repeated ids are dropped with an error.
pub fn parse_roster(experts: &[FileExpertConfig]) -> (Vec<ExpertProfile>, Vec<ConfigIssue>) {
    if experts.is_empty() {
        return (ExpertProfile::default_roster(), vec![]);
    }

    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    let mut roster = Vec::new();
    for expert in experts {
        let profile = expert.to_profile();
        if profile.id.as_str().is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidRoster,
                "experts: an entry has an empty id",
            ));
            continue;
        }
        if !seen.insert(profile.id.clone()) {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidRoster,
                format!("experts: duplicate id '{}'", profile.id),
            ));
            continue;
        }
        roster.push(profile);
    }

    if roster.is_empty() {
        issues.push(ConfigIssue::error(
            ConfigIssueCode::InvalidRoster,
            "experts: no usable entries, using the built-in roster",
        ));
        roster = ExpertProfile::default_roster();
    }
    (roster, issues)
}
