//! Literature search port

use async_trait::async_trait;
use crew_domain::{Article, ExternalFailure};

/// Search over a literature database (e.g. PubMed)
///
/// Consumed only through
/// [`LiteratureAdapter`](crate::resilience::LiteratureAdapter).
#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize)
    -> Result<Vec<Article>, ExternalFailure>;
}
