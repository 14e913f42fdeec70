//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and converted into application params
//! by the `parse_*` methods, which report problems as [`ConfigIssue`]s
//! instead of failing.

mod experts;
mod generation;
mod knowledge;
mod literature;
mod logging;
mod output;
mod resilience;
mod store;
mod workflow;

pub use experts::{FileExpertConfig, parse_roster};
pub use generation::{FileGenerationConfig, GEMINI_API_KEY_ENV};
pub use knowledge::FileKnowledgeConfig;
pub use literature::FileLiteratureConfig;
pub use logging::FileLoggingConfig;
pub use output::FileOutputConfig;
pub use resilience::FileResilienceConfig;
pub use store::{FileStoreConfig, StoreKind};
pub use workflow::FileWorkflowConfig;

use crew_application::{RelaxationParams, ResilienceParams, WorkflowParams};
use crew_domain::{ConfigIssue, ExpertProfile};
use serde::{Deserialize, Serialize};

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Generation backend
    pub generation: FileGenerationConfig,
    /// Retry, backoff and cache for every external call
    pub resilience: FileResilienceConfig,
    /// Local knowledge base and threshold relaxation
    pub knowledge: FileKnowledgeConfig,
    /// Literature search
    pub literature: FileLiteratureConfig,
    /// Consultation workflow
    pub workflow: FileWorkflowConfig,
    /// Durable store
    pub store: FileStoreConfig,
    /// Log file and event transcript
    pub logging: FileLoggingConfig,
    /// Output settings
    pub output: FileOutputConfig,
    /// Expert roster; empty means the built-in roster
    pub experts: Vec<FileExpertConfig>,
}

impl FileConfig {
    pub fn resilience_params(&self) -> ResilienceParams {
        self.resilience.parse_params().0
    }

    pub fn relaxation_params(&self) -> RelaxationParams {
        self.knowledge.parse_relaxation().0
    }

    /// Workflow params, including the literature settings experts use
    pub fn workflow_params(&self) -> WorkflowParams {
        let mut params = self.workflow.parse_params().0;
        params.literature_required = self.literature.enabled && self.literature.required;
        params.literature_max_results = self.literature.max_results;
        params
    }

    pub fn roster(&self) -> Vec<ExpertProfile> {
        parse_roster(&self.experts).0
    }

    /// Validate the entire configuration, returning all detected issues.
    ///
    /// This is the single entry point for config validation.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        issues.extend(self.generation.validate());
        issues.extend(self.resilience.parse_params().1);
        issues.extend(self.knowledge.parse_relaxation().1);
        issues.extend(self.literature.validate());
        issues.extend(self.workflow.parse_params().1);
        issues.extend(self.store.parse_kind().1);
        issues.extend(parse_roster(&self.experts).1);

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crew_application::PartialFailurePolicy;
    use crew_domain::OutputFormat;
    use std::path::PathBuf;

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[generation]
model = "gemini-2.5-flash"
api_key = "test-key"

[workflow]
max_parallel_experts = 3
require_all_experts = true

[literature]
email = "clinic@example.org"
required = true
max_results = 8

[store]
kind = "json"
dir = "/var/lib/crew"

[output]
format = "json"

[[experts]]
id = "cardiology"

[[experts]]
id = "nephrology"
display_name = "Nephrology"
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.generation.model, "gemini-2.5-flash");
        assert_eq!(config.output.format, Some(OutputFormat::Json));
        assert_eq!(
            config.store.parse_kind().0,
            StoreKind::Json(PathBuf::from("/var/lib/crew"))
        );

        let params = config.workflow_params();
        assert_eq!(params.max_parallel_experts, 3);
        assert_eq!(params.partial_failure, PartialFailurePolicy::RequireAll);
        assert!(params.literature_required);
        assert_eq!(params.literature_max_results, 8);

        let roster = config.roster();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[1].display_name, "Nephrology");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let toml_str = r#"
[knowledge]
top_k = 8
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.relaxation_params().top_k, 8);
        // Defaults should apply
        assert_eq!(config.relaxation_params().primary_threshold, 0.7);
        assert_eq!(config.workflow_params(), WorkflowParams::default());
        assert_eq!(config.roster().len(), 3);
    }

    #[test]
    fn test_validate_collects_issues_from_every_section() {
        let toml_str = r#"
[generation]
provider = "ollama"
api_key = "k"

[knowledge]
primary_threshold = 0.4
secondary_threshold = 0.6

[literature]
enabled = false

[store]
kind = "redis"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let issues = config.validate();
        assert_eq!(issues.len(), 3);
        assert_eq!(issues.iter().filter(|i| i.is_error()).count(), 2);
    }
}
