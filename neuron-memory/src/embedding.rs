//! The [`EmbeddingModel`] external-collaborator trait.
//!
//! The real embedding model is out of scope (spec Non-goal: "embedding
//! model internals"); this crate depends only on the trait, plus a
//! deterministic fallback for offline mode and tests.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from an embedding collaborator.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding service is unreachable or errored.
    #[error("embedding unavailable: {0}")]
    Unavailable(String),
}

/// Turns text into a dense vector for similarity search.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Deterministic, dependency-free embedding used for offline mode and
/// tests. Hashes lowercased word tokens into a fixed-width vector; not
/// semantically meaningful, only stable and collision-resistant enough for
/// nearest-centroid clustering tests.
pub struct HashEmbedding {
    dims: usize,
}

impl HashEmbedding {
    /// Create a new hashing embedder with the given vector width.
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; self.dims];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let hash = token
                .bytes()
                .fold(5381u64, |acc, b| acc.wrapping_mul(33).wrapping_add(b as u64));
            let idx = (hash as usize) % self.dims;
            v[idx] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedding_is_deterministic() {
        let e = HashEmbedding::default();
        let a = e.embed("hello world").await.unwrap();
        let b = e.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn hash_embedding_differs_for_different_text() {
        let e = HashEmbedding::default();
        let a = e.embed("the weather today").await.unwrap();
        let b = e.embed("rust programming language").await.unwrap();
        assert_ne!(a, b);
    }
}
