//! Consultation phases and the transition table between them.
//!
//! ```text
//! interrogating ─┬─> evaluating ─┬─> completed
//!      ^  │      │               └─> interconsulting ──> integrating ──> completed
//!      └──┘      │                      ^  │
//!  (awaiting     │                      └──┘ (tasks planned, fan-out pending)
//!   answers)     │
//!  any non-terminal phase ──> error
//! ```
//!
//! The two self-loops model "the phase has not yet advanced": interrogation
//! waiting for supplied information, and interconsultation between planning
//! its expert tasks and collecting their results.

use serde::{Deserialize, Serialize};

/// Phase of a consultation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Triage is checking whether required information is missing
    Interrogating,
    /// Triage decides between a direct answer and expert escalation
    Evaluating,
    /// Expert tasks are planned and fanned out
    Interconsulting,
    /// Expert results are merged into the final answer
    Integrating,
    /// Final result persisted (terminal)
    Completed,
    /// Workflow failed or was cancelled (terminal)
    Error,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Interrogating,
        Phase::Evaluating,
        Phase::Interconsulting,
        Phase::Integrating,
        Phase::Completed,
        Phase::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Interrogating => "interrogating",
            Phase::Evaluating => "evaluating",
            Phase::Interconsulting => "interconsulting",
            Phase::Integrating => "integrating",
            Phase::Completed => "completed",
            Phase::Error => "error",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Phase::Interrogating => "Interrogation",
            Phase::Evaluating => "Triage Evaluation",
            Phase::Interconsulting => "Interconsultation",
            Phase::Integrating => "Integration",
            Phase::Completed => "Completed",
            Phase::Error => "Error",
        }
    }

    /// Position along the workflow edges. Successful transitions never
    /// decrease it.
    pub fn rank(&self) -> u8 {
        match self {
            Phase::Interrogating => 0,
            Phase::Evaluating => 1,
            Phase::Interconsulting => 2,
            Phase::Integrating => 3,
            Phase::Completed => 4,
            Phase::Error => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Error)
    }

    /// Phases from which `resume` may re-enter the workflow
    pub fn is_resumable(&self) -> bool {
        matches!(self, Phase::Interrogating | Phase::Evaluating)
    }

    /// Exhaustive transition table
    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Completed | Error, _) => false,
            (_, Error) => true,
            (Interrogating, Interrogating | Evaluating) => true,
            (Evaluating, Completed | Interconsulting) => true,
            (Interconsulting, Interconsulting | Integrating) => true,
            (Integrating, Completed) => true,
            (Interrogating, Interconsulting | Integrating | Completed)
            | (Evaluating, Interrogating | Evaluating | Integrating)
            | (Interconsulting, Interrogating | Evaluating | Completed)
            | (Integrating, Interrogating | Evaluating | Interconsulting | Integrating) => false,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown phase: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases_have_no_exits() {
        for next in Phase::ALL {
            assert!(!Phase::Completed.can_transition_to(next));
            assert!(!Phase::Error.can_transition_to(next));
        }
    }

    #[test]
    fn test_error_reachable_from_every_non_terminal() {
        for phase in Phase::ALL.iter().filter(|p| !p.is_terminal()) {
            assert!(phase.can_transition_to(Phase::Error), "{}", phase);
        }
    }

    #[test]
    fn test_allowed_transitions_never_regress() {
        for from in Phase::ALL {
            for to in Phase::ALL {
                if from.can_transition_to(to) {
                    assert!(to.rank() >= from.rank(), "{} -> {}", from, to);
                }
            }
        }
    }

    #[test]
    fn test_happy_paths() {
        assert!(Phase::Interrogating.can_transition_to(Phase::Evaluating));
        assert!(Phase::Evaluating.can_transition_to(Phase::Completed));
        assert!(Phase::Evaluating.can_transition_to(Phase::Interconsulting));
        assert!(Phase::Interconsulting.can_transition_to(Phase::Integrating));
        assert!(Phase::Integrating.can_transition_to(Phase::Completed));
    }

    #[test]
    fn test_rejected_shortcuts() {
        assert!(!Phase::Interrogating.can_transition_to(Phase::Completed));
        assert!(!Phase::Evaluating.can_transition_to(Phase::Integrating));
        assert!(!Phase::Integrating.can_transition_to(Phase::Evaluating));
        assert!(!Phase::Evaluating.can_transition_to(Phase::Evaluating));
    }

    #[test]
    fn test_resumable_phases() {
        assert!(Phase::Interrogating.is_resumable());
        assert!(Phase::Evaluating.is_resumable());
        assert!(!Phase::Interconsulting.is_resumable());
        assert!(!Phase::Completed.is_resumable());
    }

    #[test]
    fn test_serde_and_from_str() {
        assert_eq!(
            serde_json::to_string(&Phase::Interconsulting).unwrap(),
            "\"interconsulting\""
        );
        assert_eq!("integrating".parse::<Phase>().unwrap(), Phase::Integrating);
        assert!("waiting".parse::<Phase>().is_err());
    }
}
