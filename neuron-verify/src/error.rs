//! Errors produced by the Verifier.

use thiserror::Error;

/// Errors from [`crate::verifier::Verifier::check`].
///
/// Per spec.md §4.6, an unavailable entailment capability is never an
/// `Err` here — it degrades into a `warn` verdict with reason
/// `verifier_degraded` instead, so the orchestrator's contract ("a
/// verification failure never crashes the process") holds without special
/// casing. This enum is for genuine programming errors: an unknown
/// post-condition id, or a tool spec the verifier was never told about.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum VerifierError {
    /// `ToolSpec.post_condition_id` has no entry in [`crate::postcondition::PostConditionTable`].
    #[error("no post-condition registered for id: {0}")]
    UnknownPostCondition(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
