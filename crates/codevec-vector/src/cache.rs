//! Embedding cache
//!
//! Wraps any [`EmbeddingClient`] so repeated texts (re-indexed files that did
//! not change, repeated queries) are embedded once. Backed by the moka crate
//! for a concurrent, async-aware cache with capacity and TTL bounds.
//!
//! Author: codevec contributors

use async_trait::async_trait;
use codevec_core::Result;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::embedding::EmbeddingClient;

// ============================================================================
// Cached Embedding Client
// ============================================================================

/// Embedding client decorator that memoizes results per text
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingClient>,
    cache: Cache<u64, Vec<f32>>,
    stats: Arc<CacheStats>,
    name: String,
}

impl CachedEmbedding {
    /// Wrap `inner` with a cache of at most `capacity` entries living `ttl`
    pub fn new(inner: Arc<dyn EmbeddingClient>, capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        let name = format!("cached-{}", inner.name());

        Self {
            inner,
            cache,
            stats: Arc::new(CacheStats::default()),
            name,
        }
    }

    /// Cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Drop every cached embedding
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl EmbeddingClient for CachedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = hash_text(text);
        if let Some(hit) = self.cache.get(&key).await {
            self.stats.record_hit();
            return Ok(hit);
        }

        self.stats.record_miss();
        let embedding = self.inner.embed(text).await?;
        self.cache.insert(key, embedding.clone()).await;
        self.stats.record_write();
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.cache.get(&hash_text(text)).await {
                Some(hit) => {
                    self.stats.record_hit();
                    results.push(Some(hit));
                }
                None => {
                    self.stats.record_miss();
                    results.push(None);
                    missing.push(i);
                }
            }
        }

        if !missing.is_empty() {
            let batch: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let computed = self.inner.embed_batch(&batch).await?;

            for (i, embedding) in missing.into_iter().zip(computed) {
                self.cache
                    .insert(hash_text(&texts[i]), embedding.clone())
                    .await;
                self.stats.record_write();
                results[i] = Some(embedding);
            }
        }

        results
            .into_iter()
            .map(|r| {
                r.ok_or_else(|| {
                    codevec_core::CodevecError::EmbeddingError(
                        "Embedding batch returned fewer vectors than requested".to_string(),
                    )
                })
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model_id(&self) -> String {
        self.inner.model_id()
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Hit/miss counters for the embedding cache
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Get a summary report
    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable cache statistics report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// Hash text to a 64-bit cache key
fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Tests
// ============================================================================
