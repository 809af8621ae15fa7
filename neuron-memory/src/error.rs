//! Error types for the memory service.

use thiserror::Error;

/// Errors raised by a [`crate::backend::MemoryBackend`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached (network partition, lock contention,
    /// disk full). Callers should buffer the write and retry.
    #[error("memory backend unavailable: {0}")]
    Unavailable(String),

    /// No record exists for the given user/id pair.
    #[error("memory record not found: user={user_id} id={id}")]
    NotFound {
        /// The user the lookup was scoped to.
        user_id: String,
        /// The record id that was not found.
        id: String,
    },

    /// Serializing or deserializing a record failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Catch-all for backend-specific failures.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by [`crate::service::MemoryService`] operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The backend rejected or failed to service the request.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The embedding collaborator failed.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Catch-all for other failures.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
