//! Size-bounded TTL cache shared by concurrent lookups.
//!
//! Eviction is FIFO by insertion order: re-inserting a key refreshes its
//! value and moves it to the back. Expired entries are never served.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// One cached lookup result
#[derive(Debug, Clone)]
pub struct CachedLookupEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl<V> CachedLookupEntry<V> {
    pub fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }
}

struct CacheState<V> {
    entries: HashMap<String, CachedLookupEntry<V>>,
    order: VecDeque<String>,
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Keyed cache with a time-to-live and a capacity bound
pub struct TtlCache<V> {
    ttl: Duration,
    capacity: usize,
    state: RwLock<CacheState<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Fresh value for `key`, if any
    pub fn get(&self, key: &str) -> Option<V> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match state.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or refresh `key`, then evict the oldest entries over capacity
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        if state.entries.contains_key(&key) {
            state.order.retain(|k| k != &key);
        }
        state.order.push_back(key.clone());
        state.entries.insert(
            key,
            CachedLookupEntry {
                value,
                fetched_at: Instant::now(),
                ttl: self.ttl,
            },
        );

        while state.entries.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop expired entries
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.entries.remove(key);
        }
        state.order.retain(|k| !expired.contains(k));
        expired.len()
    }

    pub fn contains_fresh(&self, key: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.entries.get(key).is_some_and(|e| !e.is_expired())
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.entries.clear();
        state.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl_and_miss_after_expiry() {
        let cache = TtlCache::new(Duration::from_secs(60), 10);
        cache.insert("q", 1);
        assert_eq!(cache.get("q"), Some(1));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("q"), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("q"), None);
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1, evictions: 0 });
    }

    #[tokio::test]
    async fn test_fifo_eviction_is_deterministic() {
        let cache = TtlCache::new(Duration::from_secs(60), 3);
        for key in ["a", "b", "c", "d"] {
            cache.insert(key, key.to_string());
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains_fresh("a"));
        assert!(cache.contains_fresh("b"));
        assert!(cache.contains_fresh("d"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_reinsert_moves_key_to_back() {
        let cache = TtlCache::new(Duration::from_secs(60), 3);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        cache.insert("a", 10);
        cache.insert("d", 4);

        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = TtlCache::new(Duration::from_secs(10), 10);
        cache.insert("old", 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.insert("new", 2);
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("new"), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_keep_structure_consistent() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60), 50));
        let mut handles = Vec::new();
        for worker in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    cache.insert(format!("{}-{}", worker, i), i);
                    let _ = cache.get(&format!("{}-{}", worker, i / 2));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len(), 50);
        let state = cache.state.read().unwrap();
        assert_eq!(state.order.len(), state.entries.len());
    }
}
