//! Infrastructure layer for clinical-crew
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer, including configuration file loading.

pub mod config;
pub mod gemini;
mod http;
pub mod knowledge;
pub mod logging;
pub mod pubmed;
pub mod store;

// Re-export commonly used types
pub use config::{ConfigLoader, FileConfig, StoreKind};
pub use gemini::{GeminiError, GeminiGateway};
pub use knowledge::{KnowledgeError, LocalKnowledgeBase};
pub use logging::JsonlEventLogger;
pub use pubmed::{PubMedClient, PubMedError};
pub use store::JsonFileConsultationStore;
