//! Domain error types

use crate::consultation::phase::Phase;
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("Consultation is sealed in phase {0} and can no longer change")]
    RecordSealed(Phase),

    #[error("Results ({results}) would exceed planned expert tasks ({tasks})")]
    ResultsExceedTasks { results: usize, tasks: usize },

    #[error("Result references unknown expert task: {0}")]
    UnknownTask(String),

    #[error("Expert tasks have already been planned for this consultation")]
    TasksAlreadyPlanned,

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}

/// Failure of an unreliable external collaborator (generation service,
/// knowledge lookup, literature search).
///
/// Only [`ExternalFailure::Transient`] is eligible for retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalFailure {
    #[error("Transient external failure: {0}")]
    Transient(String),

    #[error("Terminal external failure: {0}")]
    Terminal(String),
}

impl ExternalFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal(message.into())
    }

    /// Whether the retry policy may attempt the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExternalFailure::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ExternalFailure::Transient(m) | ExternalFailure::Terminal(m) => m,
        }
    }
}
