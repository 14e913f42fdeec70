//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod consultation_service;
pub mod expert_worker;
pub mod fan_out;
pub mod workflow;
