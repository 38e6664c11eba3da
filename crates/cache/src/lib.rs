//! # Filament Cache
//!
//! An embedding-similarity answer cache. A probe embeds the user query
//! and scans stored entries for the best cosine match; anything at or
//! above the similarity threshold is a hit and short-circuits the
//! provider call entirely. Entries live in memory behind an `RwLock`,
//! with oldest-first eviction at capacity.

pub mod vector;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use filament_core::cache::{CacheOutcome, Embedder, SemanticCache};
use filament_core::error::CacheError;

pub use vector::cosine_similarity;

const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.9;
const DEFAULT_MAX_ENTRIES: usize = 1024;

/// One cached answer, keyed by the embedding of the query that
/// produced it. Insertion order doubles as age for eviction.
#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Vec<f32>,
    answer: String,
}

/// An in-memory semantic cache over an [`Embedder`].
///
/// `get` embeds the query once and hands the embedding back on both
/// hit and miss, so a subsequent `set` never re-embeds.
pub struct VectorCache {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<CacheEntry>>,
    similarity_threshold: f32,
    max_entries: usize,
}

impl VectorCache {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    /// Minimum cosine similarity for a stored answer to count as a hit.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Capacity bound; the oldest entry is evicted when it is reached.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Best-scoring stored answer for `embedding`, if any clears the
    /// threshold.
    async fn best_match(&self, embedding: &[f32]) -> Option<(String, f32)> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|entry| {
                (
                    entry.answer.clone(),
                    cosine_similarity(&entry.embedding, embedding),
                )
            })
            .filter(|(_, score)| *score >= self.similarity_threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }
}

#[async_trait]
impl SemanticCache for VectorCache {
    async fn get(&self, query: &str) -> Result<CacheOutcome, CacheError> {
        let embedding = self.embedder.embed(query).await?;

        match self.best_match(&embedding).await {
            Some((answer, score)) => {
                debug!(score, "cache hit");
                Ok(CacheOutcome::Hit { answer, embedding })
            }
            None => Ok(CacheOutcome::Miss { embedding }),
        }
    }

    async fn set(&self, embedding: &[f32], answer: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        while entries.len() >= self.max_entries {
            entries.remove(0);
        }
        entries.push(CacheEntry {
            embedding: embedding.to_vec(),
            answer: answer.to_string(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for VectorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorCache")
            .field("similarity_threshold", &self.similarity_threshold)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Maps a few known strings to fixed unit vectors; anything else
    /// fails, so tests notice unexpected embed calls.
    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
            match text {
                "capital of france" => Ok(vec![1.0, 0.0, 0.0]),
                "capital of France?" => Ok(vec![0.99, 0.14, 0.0]),
                "rust borrow checker" => Ok(vec![0.0, 1.0, 0.0]),
                other => Err(CacheError::Embedding(format!("unknown text: {other}"))),
            }
        }
    }

    fn cache() -> VectorCache {
        VectorCache::new(Arc::new(FixedEmbedder))
    }

    #[tokio::test]
    async fn fresh_cache_misses_and_returns_embedding() {
        let cache = cache();
        let outcome = cache.get("capital of france").await.unwrap();
        match outcome {
            CacheOutcome::Miss { embedding } => assert_eq!(embedding, vec![1.0, 0.0, 0.0]),
            other => panic!("expected miss, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stored_answer_hits_for_similar_query() {
        let cache = cache();
        cache.set(&[1.0, 0.0, 0.0], "Paris").await.unwrap();

        // Nearly parallel vector, similarity ~0.99
        let outcome = cache.get("capital of France?").await.unwrap();
        match outcome {
            CacheOutcome::Hit { answer, .. } => assert_eq!(answer, "Paris"),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dissimilar_query_misses() {
        let cache = cache();
        cache.set(&[1.0, 0.0, 0.0], "Paris").await.unwrap();

        let outcome = cache.get("rust borrow checker").await.unwrap();
        assert!(!outcome.is_hit());
    }

    #[tokio::test]
    async fn threshold_is_configurable() {
        let strict = cache().with_similarity_threshold(0.999);
        strict.set(&[1.0, 0.0, 0.0], "Paris").await.unwrap();

        // ~0.99 similarity no longer clears the bar
        let outcome = strict.get("capital of France?").await.unwrap();
        assert!(!outcome.is_hit());

        let lax = cache().with_similarity_threshold(0.5);
        lax.set(&[1.0, 0.0, 0.0], "Paris").await.unwrap();
        assert!(lax.get("capital of France?").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn best_match_wins_among_several() {
        let cache = cache().with_similarity_threshold(0.5);
        cache.set(&[0.9, 0.44, 0.0], "close").await.unwrap();
        cache.set(&[1.0, 0.0, 0.0], "exact").await.unwrap();

        match cache.get("capital of france").await.unwrap() {
            CacheOutcome::Hit { answer, .. } => assert_eq!(answer, "exact"),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_first() {
        let cache = cache().with_max_entries(2).with_similarity_threshold(0.99);
        cache.set(&[1.0, 0.0, 0.0], "first").await.unwrap();
        cache.set(&[0.0, 1.0, 0.0], "second").await.unwrap();
        cache.set(&[0.0, 0.0, 1.0], "third").await.unwrap();

        assert_eq!(cache.len().await, 2);
        // "first" was evicted, so its query now misses
        assert!(!cache.get("capital of france").await.unwrap().is_hit());
        // "second" survived
        assert!(cache.get("rust borrow checker").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn embedder_failure_propagates() {
        let cache = cache();
        let err = cache.get("unmapped query").await.unwrap_err();
        assert!(matches!(err, CacheError::Embedding(_)));
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let cache = cache();
        cache.set(&[1.0, 0.0, 0.0], "Paris").await.unwrap();
        assert_eq!(cache.len().await, 1);
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
