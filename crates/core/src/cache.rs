//! Semantic cache and embedder traits.
//!
//! The cache maps a normalized user query to a previously produced
//! answer via embedding similarity. A miss is ordinary control flow:
//! the probe still returns the query embedding so the eventual write
//! after a live round trip can reuse it instead of embedding twice.

use async_trait::async_trait;

use crate::error::CacheError;

/// The result of a cache probe.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOutcome {
    /// A stored answer matched the query.
    Hit {
        answer: String,
        embedding: Vec<f32>,
    },
    /// No stored answer matched; the caller should go to the provider
    /// and may use `embedding` for the subsequent write.
    Miss { embedding: Vec<f32> },
}

impl CacheOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    /// The probe embedding, present on both arms.
    pub fn embedding(&self) -> &[f32] {
        match self {
            Self::Hit { embedding, .. } | Self::Miss { embedding } => embedding,
        }
    }
}

/// A similarity-keyed store mapping queries to answers.
///
/// One read probe and at most one write happen per generation call; no
/// internal read-modify-write protection is promised, so concurrent
/// calls sharing an instance must serialize their own access.
#[async_trait]
pub trait SemanticCache: Send + Sync {
    /// Probe for an answer to `query`.
    async fn get(&self, query: &str) -> std::result::Result<CacheOutcome, CacheError>;

    /// Store an answer under a previously computed query embedding.
    async fn set(
        &self,
        embedding: &[f32],
        answer: &str,
    ) -> std::result::Result<(), CacheError>;
}

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_exposes_embedding_on_both_arms() {
        let hit = CacheOutcome::Hit {
            answer: "42".into(),
            embedding: vec![1.0, 0.0],
        };
        let miss = CacheOutcome::Miss {
            embedding: vec![0.0, 1.0],
        };

        assert!(hit.is_hit());
        assert!(!miss.is_hit());
        assert_eq!(hit.embedding(), &[1.0, 0.0]);
        assert_eq!(miss.embedding(), &[0.0, 1.0]);
    }
}
