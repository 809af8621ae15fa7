//! Errors produced by the Sandbox Executor.

use thiserror::Error;

/// Errors from [`crate::executor::Executor::execute`] itself, distinct from
/// a normal (possibly unsuccessful) [`crate::types::ExecutionResult`] — the
/// executor failed to even produce a result (unknown tool, scratch-dir
/// setup failure).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// No [`crate::handler::ToolHandler`] is registered under this name.
    #[error("no handler registered for tool: {0}")]
    NotFound(String),

    /// A fresh scratch directory could not be created for the turn.
    #[error("scratch directory setup failed: {0}")]
    ScratchSetup(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
