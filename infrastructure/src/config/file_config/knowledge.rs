//! Knowledge base configuration from TOML (`[knowledge]` section)

use crew_application::RelaxationParams;
use crew_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw knowledge base configuration from TOML
///
/// # Example
///
/// ```toml
/// [knowledge]
/// root = "~/clinical-guidelines"   # one sub-directory per expert
/// pattern = "**/*.md"
/// top_k = 5
/// primary_threshold = 0.7
/// secondary_threshold = 0.5
/// min_results = 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileKnowledgeConfig {
    /// Directory holding the guideline documents
    pub root: Option<PathBuf>,
    /// Glob, relative to `root`, selecting the documents to index
    pub pattern: String,
    pub top_k: usize,
    pub primary_threshold: f64,
    pub secondary_threshold: f64,
    pub min_results: usize,
}

impl Default for FileKnowledgeConfig {
    fn default() -> Self {
        let relaxation = RelaxationParams::default();
        Self {
            root: None,
            pattern: "**/*.md".to_string(),
            top_k: relaxation.top_k,
            primary_threshold: relaxation.primary_threshold,
            secondary_threshold: relaxation.secondary_threshold,
            min_results: relaxation.min_results,
        }
    }
}

impl FileKnowledgeConfig {
    /// Directory to index: the configured root, or the per-user data dir
    pub fn resolve_root(&self) -> Option<PathBuf> {
        self.root
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("clinical-crew").join("knowledge")))
    }

    /// Convert to relaxation params; threshold problems fall back to defaults
    pub fn parse_relaxation(&self) -> (RelaxationParams, Vec<ConfigIssue>) {
        let mut issues = Vec::new();
        let defaults = RelaxationParams::default();

        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        let (primary, secondary) =
            if !in_range(self.primary_threshold) || !in_range(self.secondary_threshold) {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::OutOfRange,
                    "knowledge thresholds must lie in [0, 1], using defaults",
                ));
                (defaults.primary_threshold, defaults.secondary_threshold)
            } else if self.secondary_threshold >= self.primary_threshold {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::ThresholdOrder,
                    format!(
                        "knowledge.secondary_threshold ({}) must be below primary_threshold ({}), using defaults",
                        self.secondary_threshold, self.primary_threshold
                    ),
                ));
                (defaults.primary_threshold, defaults.secondary_threshold)
            } else {
                (self.primary_threshold, self.secondary_threshold)
            };

        if self.top_k == 0 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::OutOfRange,
                "knowledge.top_k is 0, using 1",
            ));
        }

        let params = RelaxationParams {
            top_k: self.top_k.max(1),
            primary_threshold: primary,
            secondary_threshold: secondary,
            min_results: self.min_results,
        };
        (params, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_thresholds_are_rejected() {
        let config = FileKnowledgeConfig {
            primary_threshold: 0.5,
            secondary_threshold: 0.7,
            ..Default::default()
        };
        let (params, issues) = config.parse_relaxation();
        assert_eq!(issues[0].code, ConfigIssueCode::ThresholdOrder);
        assert_eq!(params, RelaxationParams::default());
    }

    #[test]
    fn test_valid_thresholds_pass_through() {
        let config = FileKnowledgeConfig {
            primary_threshold: 0.8,
            secondary_threshold: 0.6,
            min_results: 3,
            ..Default::default()
        };
        let (params, issues) = config.parse_relaxation();
        assert!(issues.is_empty());
        assert_eq!(params.primary_threshold, 0.8);
        assert_eq!(params.min_results, 3);
    }
}
