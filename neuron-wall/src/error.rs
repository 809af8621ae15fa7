//! Errors produced by the Validation Wall.

use thiserror::Error;

/// Errors from [`crate::wall::Wall::evaluate`].
///
/// These are infrastructure failures, distinct from a normal `Rejected`
/// [`crate::types::WallVerdict`] — a rejection is an expected outcome of
/// policy, this is the Wall itself failing to produce one.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WallError {
    /// The append-only audit log could not be written. Per spec.md §4.4
    /// tier 5, this must propagate rather than be swallowed.
    #[error("audit log write failed: {0}")]
    AuditFailure(String),

    /// The tool named by the plan has no registered [`neuron_tool::ToolSpec`].
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
