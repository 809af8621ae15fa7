//! [`ToolHandler`]: the per-tool execution seam the [`crate::executor::Executor`]
//! dispatches to.

use async_trait::async_trait;

use crate::types::{ExecutionContext, ExecutionResult};

/// A tool implementation. Distinct from `neuron_types::ToolDyn` (the
/// LLM-facing function-calling seam `neuron-tool` owns): a `ToolHandler`
/// is sandbox-facing — it receives capabilities and a scratch directory
/// instead of an arbitrary `ToolContext`, and returns the richer
/// [`ExecutionResult`] the Verifier needs (side-effect log, citations,
/// timing) instead of a chat-shaped `ToolOutput`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with already schema-validated `args`.
    ///
    /// Implementations must check `ctx.has(capability)` before using a
    /// capability and return an `ExecutionResult` built via
    /// [`ExecutionResult::failed`] with
    /// [`crate::types::ExecutionErrorKind::CapabilityDenied`] rather than
    /// proceeding — the executor grants capabilities per the tool's
    /// `SideEffect` descriptor but does not itself intercept syscalls.
    async fn run(&self, args: &serde_json::Value, ctx: &ExecutionContext) -> ExecutionResult;
}
