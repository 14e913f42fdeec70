//! Resilient wrappers around the external collaborators.
//!
//! - [`ResilientGenerator`] - retry only; prompts are never cached
//! - [`KnowledgeAdapter`] - cache + retry + adaptive threshold relaxation
//! - [`LiteratureAdapter`] - cache + retry
//!
//! Every adapter is shared by concurrent expert tasks through an `Arc`.

use super::cache::{CacheStats, TtlCache};
use super::retry::retry_with_backoff;
use crate::config::{RelaxationParams, ResilienceParams};
use crate::ports::generation::GenerationService;
use crate::ports::knowledge_lookup::{KnowledgeLookup, KnowledgeQuery};
use crate::ports::literature_search::LiteratureSearch;
use crew_domain::{Article, ExternalFailure, KnowledgeChunk};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Generation service with bounded retry
pub struct ResilientGenerator {
    service: Arc<dyn GenerationService>,
    params: ResilienceParams,
}

impl ResilientGenerator {
    pub fn new(service: Arc<dyn GenerationService>, params: ResilienceParams) -> Self {
        Self { service, params }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, ExternalFailure> {
        let service = &self.service;
        retry_with_backoff(&self.params, "generate", move |_| async move {
            service.generate(prompt).await
        })
        .await
    }
}

/// Outcome of a relaxed knowledge lookup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelaxedLookup {
    pub items: Vec<KnowledgeChunk>,
    /// Whether the supplementary fetch at the secondary threshold ran
    pub relaxed: bool,
    /// Chunks contributed by the supplementary fetch
    pub supplementary_added: usize,
}

/// Knowledge lookup with caching, retry and adaptive relaxation.
///
/// If fewer than `min_results` chunks clear the primary threshold, exactly
/// one supplementary fetch is made at the secondary threshold. Chunks
/// already returned at the primary threshold are never repeated.
pub struct KnowledgeAdapter {
    source: Arc<dyn KnowledgeLookup>,
    params: ResilienceParams,
    relaxation: RelaxationParams,
    cache: TtlCache<Vec<KnowledgeChunk>>,
}

impl KnowledgeAdapter {
    pub fn new(
        source: Arc<dyn KnowledgeLookup>,
        params: ResilienceParams,
        relaxation: RelaxationParams,
    ) -> Self {
        let cache = TtlCache::new(params.cache_ttl, params.cache_capacity);
        Self {
            source,
            params,
            relaxation,
            cache,
        }
    }

    pub fn relaxation(&self) -> &RelaxationParams {
        &self.relaxation
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn fetch(&self, query: &KnowledgeQuery) -> Result<RelaxedLookup, ExternalFailure> {
        let primary_threshold = self.relaxation.primary_threshold;
        let mut items: Vec<KnowledgeChunk> = self
            .search_at(query, primary_threshold)
            .await?
            .into_iter()
            .filter(|chunk| chunk.score >= primary_threshold)
            .collect();

        if items.len() >= self.relaxation.min_results {
            return Ok(RelaxedLookup {
                items,
                relaxed: false,
                supplementary_added: 0,
            });
        }

        let secondary_threshold = self.relaxation.secondary_threshold;
        debug!(
            found = items.len(),
            min_results = self.relaxation.min_results,
            secondary_threshold,
            "Relaxing knowledge lookup threshold"
        );

        let supplementary = match self.search_at(query, secondary_threshold).await {
            Ok(chunks) => chunks,
            Err(e) if !items.is_empty() => {
                warn!(error = %e, "Supplementary knowledge fetch failed, keeping primary results");
                return Ok(RelaxedLookup {
                    items,
                    relaxed: true,
                    supplementary_added: 0,
                });
            }
            Err(e) => return Err(e),
        };

        let mut seen: HashSet<String> = items.iter().map(KnowledgeChunk::identity).collect();
        let before = items.len();
        for chunk in supplementary {
            if chunk.score >= secondary_threshold && seen.insert(chunk.identity()) {
                items.push(chunk);
            }
        }
        items.truncate(query.top_k.max(before));
        let supplementary_added = items.len() - before;

        info!(
            primary = before,
            supplementary_added, "Knowledge lookup relaxed to secondary threshold"
        );
        Ok(RelaxedLookup {
            items,
            relaxed: true,
            supplementary_added,
        })
    }

    async fn search_at(
        &self,
        query: &KnowledgeQuery,
        threshold: f64,
    ) -> Result<Vec<KnowledgeChunk>, ExternalFailure> {
        let key = query.cache_key(threshold);
        if let Some(hit) = self.cache.get(&key) {
            debug!(threshold, "Knowledge cache hit");
            return Ok(hit);
        }

        let source = &self.source;
        let chunks = retry_with_backoff(&self.params, "knowledge_lookup", move |_| async move {
            source.search(query, threshold).await
        })
        .await?;

        self.cache.insert(key, chunks.clone());
        Ok(chunks)
    }
}

/// Literature search with caching and retry
pub struct LiteratureAdapter {
    source: Arc<dyn LiteratureSearch>,
    params: ResilienceParams,
    cache: TtlCache<Vec<Article>>,
}

impl LiteratureAdapter {
    pub fn new(source: Arc<dyn LiteratureSearch>, params: ResilienceParams) -> Self {
        let cache = TtlCache::new(params.cache_ttl, params.cache_capacity);
        Self {
            source,
            params,
            cache,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Article>, ExternalFailure> {
        let key = format!("{}|{}", max_results, query.trim().to_lowercase());
        if let Some(hit) = self.cache.get(&key) {
            debug!("Literature cache hit");
            return Ok(hit);
        }

        let source = &self.source;
        let articles = retry_with_backoff(&self.params, "literature_search", move |_| async move {
            source.search(query, max_results).await
        })
        .await?;

        self.cache.insert(key, articles.clone());
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Knowledge source returning fixed chunks filtered by threshold
    struct FixedKnowledge {
        chunks: Vec<KnowledgeChunk>,
        calls: Mutex<Vec<f64>>,
        fail_below: Option<f64>,
    }

    impl FixedKnowledge {
        fn new(chunks: Vec<KnowledgeChunk>) -> Self {
            Self {
                chunks,
                calls: Mutex::new(Vec::new()),
                fail_below: None,
            }
        }

        fn thresholds(&self) -> Vec<f64> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KnowledgeLookup for FixedKnowledge {
        async fn search(
            &self,
            query: &KnowledgeQuery,
            threshold: f64,
        ) -> Result<Vec<KnowledgeChunk>, ExternalFailure> {
            self.calls.lock().unwrap().push(threshold);
            if self.fail_below.is_some_and(|limit| threshold < limit) {
                return Err(ExternalFailure::terminal("index unavailable"));
            }
            Ok(self
                .chunks
                .iter()
                .filter(|c| c.score >= threshold)
                .take(query.top_k)
                .cloned()
                .collect())
        }
    }

    fn chunk(source: &str, index: u32, score: f64) -> KnowledgeChunk {
        KnowledgeChunk::new(format!("{} part {}", source, index), score)
            .with_metadata("source", source)
            .with_metadata("chunk_index", index)
    }

    fn params() -> ResilienceParams {
        ResilienceParams::default()
            .with_backoff(2.0, Duration::from_millis(1))
            .with_cache(Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn test_relaxation_performs_exactly_one_supplementary_fetch() {
        let source = Arc::new(FixedKnowledge::new(vec![
            chunk("ada.md", 0, 0.62),
            chunk("ada.md", 1, 0.55),
            chunk("kdigo.md", 0, 0.31),
        ]));
        let adapter = KnowledgeAdapter::new(source.clone(), params(), RelaxationParams::default());

        let lookup = adapter
            .fetch(&KnowledgeQuery::new("insulin titration", 5))
            .await
            .unwrap();

        assert!(lookup.relaxed);
        assert_eq!(lookup.items.len(), 2);
        assert_eq!(lookup.supplementary_added, 2);
        assert_eq!(source.thresholds(), vec![0.7, 0.5]);
    }

    #[tokio::test]
    async fn test_relaxation_never_duplicates_primary_results() {
        let source = Arc::new(FixedKnowledge::new(vec![
            chunk("ada.md", 0, 0.9),
            chunk("ada.md", 1, 0.6),
        ]));
        let adapter = KnowledgeAdapter::new(source.clone(), params(), RelaxationParams::default());

        let lookup = adapter
            .fetch(&KnowledgeQuery::new("hba1c target", 5))
            .await
            .unwrap();

        let ids: Vec<String> = lookup.items.iter().map(KnowledgeChunk::identity).collect();
        assert_eq!(ids, vec!["ada.md#0", "ada.md#1"]);
        assert_eq!(lookup.supplementary_added, 1);
    }

    #[tokio::test]
    async fn test_no_relaxation_when_primary_suffices() {
        let source = Arc::new(FixedKnowledge::new(vec![
            chunk("ada.md", 0, 0.9),
            chunk("ada.md", 1, 0.8),
        ]));
        let adapter = KnowledgeAdapter::new(source.clone(), params(), RelaxationParams::default());

        let lookup = adapter.fetch(&KnowledgeQuery::new("metformin", 5)).await.unwrap();

        assert!(!lookup.relaxed);
        assert_eq!(lookup.items.len(), 2);
        assert_eq!(source.thresholds(), vec![0.7]);
    }

    #[tokio::test]
    async fn test_relaxation_gives_up_with_empty_result() {
        let source = Arc::new(FixedKnowledge::new(vec![chunk("misc.md", 0, 0.1)]));
        let adapter = KnowledgeAdapter::new(source.clone(), params(), RelaxationParams::default());

        let lookup = adapter.fetch(&KnowledgeQuery::new("rare", 5)).await.unwrap();

        assert!(lookup.items.is_empty());
        assert!(lookup.relaxed);
        assert_eq!(source.thresholds().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_supplementary_fetch_keeps_primary_results() {
        let mut fixed = FixedKnowledge::new(vec![chunk("ada.md", 0, 0.9)]);
        fixed.fail_below = Some(0.6);
        let source = Arc::new(fixed);
        let adapter = KnowledgeAdapter::new(source, params(), RelaxationParams::default());

        let lookup = adapter.fetch(&KnowledgeQuery::new("statin", 5)).await.unwrap();

        assert_eq!(lookup.items.len(), 1);
        assert_eq!(lookup.supplementary_added, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_knowledge_cache_respects_ttl() {
        let source = Arc::new(FixedKnowledge::new(vec![
            chunk("ada.md", 0, 0.9),
            chunk("ada.md", 1, 0.8),
        ]));
        let adapter = KnowledgeAdapter::new(source.clone(), params(), RelaxationParams::default());
        let query = KnowledgeQuery::new("metformin", 5);

        adapter.fetch(&query).await.unwrap();
        adapter.fetch(&query).await.unwrap();
        assert_eq!(source.thresholds().len(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        adapter.fetch(&query).await.unwrap();
        assert_eq!(source.thresholds().len(), 2);
    }

    struct CountingLiterature {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LiteratureSearch for CountingLiterature {
        async fn search(
            &self,
            query: &str,
            _max_results: usize,
        ) -> Result<Vec<Article>, ExternalFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Article::new("123", query)])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_literature_cache_hit_within_ttl_then_expiry() {
        let source = Arc::new(CountingLiterature {
            calls: AtomicUsize::new(0),
        });
        let adapter = LiteratureAdapter::new(source.clone(), params());

        adapter.search("sglt2 ckd", 5).await.unwrap();
        adapter.search("SGLT2 CKD ", 5).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        adapter.search("sglt2 ckd", 5).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    struct FlakyGenerator {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl GenerationService for FlakyGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, ExternalFailure> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(ExternalFailure::transient("429 Too Many Requests"));
            }
            Ok(format!("echo: {}", prompt))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_retries_transient_failures() {
        let service = Arc::new(FlakyGenerator {
            calls: AtomicUsize::new(0),
            failures: 2,
        });
        let generator = ResilientGenerator::new(service.clone(), params());

        assert_eq!(generator.generate("hi").await.unwrap(), "echo: hi");
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_exhaustion_is_terminal() {
        let service = Arc::new(FlakyGenerator {
            calls: AtomicUsize::new(0),
            failures: usize::MAX,
        });
        let generator = ResilientGenerator::new(service, params().with_max_attempts(2));

        let err = generator.generate("hi").await.unwrap_err();
        assert!(matches!(err, ExternalFailure::Terminal(_)));
    }
}
