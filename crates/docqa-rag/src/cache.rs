//! Query embedding cache
//!
//! Repeated questions skip the embedding provider entirely. Embeddings depend
//! only on the text and the provider, so entries stay valid across index
//! swaps and expire by TTL.
//!
//! Uses the moka crate for thread-safe, async-compatible caching.
//!
//! Author: hephaex@gmail.com

use docqa_core::{EmbeddingVector, RagConfig};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cache of query text → embedding vector
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<u64, EmbeddingVector>,
    stats: Arc<CacheStats>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` entries for `ttl`
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Create from config. A capacity of zero disables caching.
    pub fn from_config(config: &RagConfig) -> Option<Self> {
        (config.query_cache_capacity > 0).then(|| {
            Self::new(
                config.query_cache_capacity,
                Duration::from_secs(config.query_cache_ttl_secs),
            )
        })
    }

    /// Get an embedding from cache
    pub async fn get(&self, text: &str) -> Option<EmbeddingVector> {
        let result = self.cache.get(&hash_text(text)).await;

        if result.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }

        result
    }

    /// Store an embedding in cache
    pub async fn put(&self, text: &str, embedding: EmbeddingVector) {
        self.cache.insert(hash_text(text), embedding).await;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Clear all cached embeddings
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        // Wait for all pending invalidations to complete
        self.cache.run_pending_tasks().await;
    }

    /// Get current cache size
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn stats(&self) -> CacheStatsReport {
        self.stats.report(self.entry_count())
    }
}

/// Hit/miss counters
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    fn report(&self, entries: u64) -> CacheStatsReport {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStatsReport {
            entries,
            hits,
            misses,
            writes: self.writes.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

/// Serializable cache statistics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> EmbeddingCache {
        EmbeddingCache::new(100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_embedding_cache_basic() {
        let cache = cache();

        let text = "What is the leave policy?";
        let embedding = vec![0.1, 0.2, 0.3, 0.4];

        // Initially not in cache
        assert!(cache.get(text).await.is_none());

        cache.put(text, embedding.clone()).await;
        assert_eq!(cache.get(text).await, Some(embedding));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = cache();
        cache.put("a", vec![1.0]).await;
        cache.clear().await;
        assert!(cache.get("a").await.is_none());
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let config = RagConfig {
            query_cache_capacity: 0,
            ..Default::default()
        };
        assert!(EmbeddingCache::from_config(&config).is_none());
        assert!(EmbeddingCache::from_config(&RagConfig::default()).is_some());
    }
}
