//! Resilient access to unreliable external collaborators.
//!
//! Retry with exponential backoff bounded by attempts and elapsed time, a
//! size-bounded TTL cache, and adaptive threshold relaxation for scored
//! lookups.

pub mod adapter;
pub mod cache;
pub mod retry;

pub use adapter::{KnowledgeAdapter, LiteratureAdapter, RelaxedLookup, ResilientGenerator};
pub use cache::{CacheStats, TtlCache};
pub use retry::retry_with_backoff;
