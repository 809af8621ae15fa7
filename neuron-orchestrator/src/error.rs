//! Errors from the Pipeline Orchestrator.

use thiserror::Error;

/// Errors from [`crate::pipeline::Pipeline::handle_turn`].
///
/// Per spec.md §7, almost every failure mode the pipeline encounters is
/// absorbed into a refusal reply rather than surfaced as an `Err` — this
/// enum is reserved for the few infrastructure failures that must abort
/// the turn outright (an unauditable action, a dependency that itself
/// returned a hard error rather than a degraded result).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The audit log could not be written; per spec.md §7 this escalates
    /// rather than degrading, because an unauditable action must not
    /// surface.
    #[error("audit failure, turn aborted: {0}")]
    AuditFailure(#[from] neuron_wall::WallError),

    /// The memory backend failed in a way that isn't itself recoverable
    /// (e.g. at `assembleContext`, which has no "skip it" fallback).
    #[error("memory backend error: {0}")]
    Memory(String),

    /// The sandbox executor failed to dispatch (unknown tool, scratch
    /// setup failure) rather than the tool itself failing.
    #[error("executor error: {0}")]
    Executor(#[from] neuron_executor::ExecutorError),

    /// The verifier was misconfigured (unknown post-condition id).
    #[error("verifier error: {0}")]
    Verifier(#[from] neuron_verify::VerifierError),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
