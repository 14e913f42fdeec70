//! Workflow parameters — consultation loop control.

use std::time::Duration;

/// What to do when some, but not all, expert tasks fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialFailurePolicy {
    /// Integrate what succeeded and document the missing experts
    #[default]
    Degrade,
    /// Any failed expert fails the consultation
    RequireAll,
}

/// Consultation workflow control parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowParams {
    /// Upper bound on concurrently running expert tasks
    pub max_parallel_experts: usize,
    /// Interrogation rounds before evaluation is forced
    pub max_interrogation_rounds: u32,
    pub partial_failure: PartialFailurePolicy,
    /// Per-expert deadline enforced by the workflow (not the executor)
    pub expert_timeout: Option<Duration>,
    /// Fail an expert task when its literature search fails
    pub literature_required: bool,
    pub literature_max_results: usize,
}

impl Default for WorkflowParams {
    fn default() -> Self {
        Self {
            max_parallel_experts: 5,
            max_interrogation_rounds: 2,
            partial_failure: PartialFailurePolicy::Degrade,
            expert_timeout: Some(Duration::from_secs(120)),
            literature_required: false,
            literature_max_results: 5,
        }
    }
}

impl WorkflowParams {
    // ==================== Builder Methods ====================

    pub fn with_max_parallel_experts(mut self, max: usize) -> Self {
        self.max_parallel_experts = max;
        self
    }

    pub fn with_max_interrogation_rounds(mut self, rounds: u32) -> Self {
        self.max_interrogation_rounds = rounds;
        self
    }

    pub fn with_partial_failure(mut self, policy: PartialFailurePolicy) -> Self {
        self.partial_failure = policy;
        self
    }

    pub fn with_expert_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.expert_timeout = timeout;
        self
    }

    pub fn with_literature_required(mut self, required: bool) -> Self {
        self.literature_required = required;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let params = WorkflowParams::default();
        assert_eq!(params.max_parallel_experts, 5);
        assert_eq!(params.max_interrogation_rounds, 2);
        assert_eq!(params.partial_failure, PartialFailurePolicy::Degrade);
        assert!(!params.literature_required);
    }

    #[test]
    fn test_builder() {
        let params = WorkflowParams::default()
            .with_max_parallel_experts(2)
            .with_partial_failure(PartialFailurePolicy::RequireAll)
            .with_expert_timeout(None);
        assert_eq!(params.max_parallel_experts, 2);
        assert_eq!(params.partial_failure, PartialFailurePolicy::RequireAll);
        assert!(params.expert_timeout.is_none());
    }
}
