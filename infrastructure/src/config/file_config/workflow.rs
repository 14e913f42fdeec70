//! Workflow configuration from TOML (`[workflow]` section)

use crew_application::{PartialFailurePolicy, WorkflowParams};
use crew_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw workflow configuration from TOML
///
/// # Example
///
/// ```toml
/// [workflow]
/// max_parallel_experts = 5
/// max_interrogation_rounds = 2
/// require_all_experts = false   # true: any failed expert fails the consultation
/// expert_timeout_secs = 120     # 0 disables the per-expert deadline
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWorkflowConfig {
    pub max_parallel_experts: usize,
    pub max_interrogation_rounds: u32,
    pub require_all_experts: bool,
    pub expert_timeout_secs: u64,
}

impl Default for FileWorkflowConfig {
    fn default() -> Self {
        let params = WorkflowParams::default();
        Self {
            max_parallel_experts: params.max_parallel_experts,
            max_interrogation_rounds: params.max_interrogation_rounds,
            require_all_experts: false,
            expert_timeout_secs: params.expert_timeout.map(|d| d.as_secs()).unwrap_or(0),
        }
    }
}

impl FileWorkflowConfig {
    pub fn parse_params(&self) -> (WorkflowParams, Vec<ConfigIssue>) {
        let mut issues = Vec::new();

        if self.max_parallel_experts == 0 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::OutOfRange,
                "workflow.max_parallel_experts is 0, using 1",
            ));
        }

        let policy = if self.require_all_experts {
            PartialFailurePolicy::RequireAll
        } else {
            PartialFailurePolicy::Degrade
        };
        let timeout = (self.expert_timeout_secs > 0)
            .then(|| Duration::from_secs(self.expert_timeout_secs));

        let params = WorkflowParams::default()
            .with_max_parallel_experts(self.max_parallel_experts.max(1))
            .with_max_interrogation_rounds(self.max_interrogation_rounds)
            .with_partial_failure(policy)
            .with_expert_timeout(timeout);
        (params, issues)
    }
}
