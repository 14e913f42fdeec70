//! Knowledge lookup port
//!
//! Quality-scored similarity search over the knowledge base. Consumed only
//! through [`KnowledgeAdapter`](crate::resilience::KnowledgeAdapter).

use async_trait::async_trait;
use crew_domain::{ExpertId, ExternalFailure, KnowledgeChunk};

/// A knowledge-base query
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeQuery {
    pub text: String,
    /// Restrict the search to one expert's collection
    pub scope: Option<ExpertId>,
    pub top_k: usize,
}

impl KnowledgeQuery {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            scope: None,
            top_k,
        }
    }

    pub fn scoped(mut self, expert: ExpertId) -> Self {
        self.scope = Some(expert);
        self
    }

    /// Cache key for this query at a given threshold
    pub fn cache_key(&self, threshold: f64) -> String {
        format!(
            "{}|{}|{:.4}|{}",
            self.scope.as_ref().map(|s| s.as_str()).unwrap_or("*"),
            self.top_k,
            threshold,
            self.text.trim().to_lowercase()
        )
    }
}

/// Similarity search over the knowledge base
#[async_trait]
pub trait KnowledgeLookup: Send + Sync {
    /// Return at most `top_k` chunks scoring at least `threshold`
    async fn search(
        &self,
        query: &KnowledgeQuery,
        threshold: f64,
    ) -> Result<Vec<KnowledgeChunk>, ExternalFailure>;
}
