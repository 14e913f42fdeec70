//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod consultation_store;
pub mod event_subscriber;
pub mod generation;
pub mod knowledge_lookup;
pub mod literature_search;
