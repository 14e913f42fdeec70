//! Generation service port
//!
//! Defines the interface for the natural-language generation backend that
//! answers every workflow prompt.

use async_trait::async_trait;
use crew_domain::ExternalFailure;

/// Text generation backend
///
/// Implementations (adapters) live in the infrastructure layer. Failures
/// must be classified: only [`ExternalFailure::Transient`] is retried.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate a completion for a prompt
    async fn generate(&self, prompt: &str) -> Result<String, ExternalFailure>;
}
