//! Knowledge base adapters implementing the
//! [`KnowledgeLookup`](crew_application::KnowledgeLookup) port.

mod local;

pub use local::{KnowledgeError, LocalKnowledgeBase};
