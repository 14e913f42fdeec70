//! Application-level configuration.
//!
//! This module provides configuration types that control how use cases behave:
//!
//! - [`ResilienceParams`] — retry, backoff and cache for external calls
//! - [`RelaxationParams`] — adaptive threshold relaxation for knowledge lookups
//! - [`WorkflowParams`] — fan-out width, interrogation rounds, failure policy

pub mod resilience_params;
pub mod workflow_params;

pub use resilience_params::{RelaxationParams, ResilienceParams};
pub use workflow_params::{PartialFailurePolicy, WorkflowParams};
