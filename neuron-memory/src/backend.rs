//! The [`MemoryBackend`] capability trait.
//!
//! Deliberately narrower than [`layer0::StateStore`]: memory storage is
//! always scoped to a single user and keyed by record id, and needs a
//! vector-similarity query that `StateStore`'s generic text search does not
//! provide. Implementations live in `neuron-state-memory` (in-process) and
//! `neuron-state-fs` (JSON-Lines file).

use crate::error::BackendError;
use crate::types::MemoryRecord;
use async_trait::async_trait;

/// Storage capability required by [`crate::service::MemoryService`].
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Persist a record, overwriting any existing record with the same id.
    async fn put(&self, record: MemoryRecord) -> Result<(), BackendError>;

    /// Fetch a single record by id, scoped to `user_id`.
    async fn get_by_id(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<MemoryRecord>, BackendError>;

    /// List a user's records, most recent first, capped at `limit`.
    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, BackendError>;

    /// Rank a user's records by cosine similarity to `query_embedding`,
    /// returning the top `top_k` as `(record, similarity)` pairs.
    async fn vector_query(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>, BackendError>;

    /// Delete a record by id. Returns `true` if a record was removed.
    async fn delete_by_id(&self, user_id: &str, id: &str) -> Result<bool, BackendError>;
}

/// Cosine similarity of two equal-length vectors, clamped to `[0, 1]`.
/// Returns `0.0` for empty or mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
}
