//! Trait seams: [`Tool`]/[`ToolDyn`], [`Provider`], [`ContextStrategy`],
//! [`ObservabilityHook`], [`DurableContext`], and [`PermissionPolicy`].
//!
//! Several of these return `impl Future` (RPITIT) rather than boxing, so
//! implementations avoid a heap allocation per call. That makes the trait
//! itself non-dyn-compatible; crates that need a trait object (`neuron-loop`,
//! `neuron-tool`) define a small `Erased*`/`Boxed*` wrapper locally instead of
//! making these traits object-safe.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ContextError, DurableError, HookError, ProviderError, ToolError};
use crate::stream::StreamHandle;
use crate::types::{
    CompletionRequest, CompletionResponse, ContentItem, Message, ToolContext, ToolDefinition,
    ToolOutput,
};
use crate::wasm::{WasmBoxedFuture, WasmCompatSend, WasmCompatSync};

// --- Tool / ToolDyn -----------------------------------------------------

/// A strongly-typed tool.
///
/// Implementors describe their arguments and output as ordinary Rust types;
/// the blanket [`ToolDyn`] impl below handles (de)serialization so the tool
/// can sit in a [`crate::types::ToolDefinition`]-driven registry alongside
/// tools implemented other ways (MCP servers, HTTP endpoints).
pub trait Tool: Send + Sync {
    /// The tool's unique name, also used as [`ToolDefinition::name`].
    const NAME: &'static str;
    /// Deserialized argument type.
    type Args: DeserializeOwned + Send;
    /// Output type, serialized into [`ToolOutput::structured_content`].
    type Output: Serialize + Send;
    /// Error type returned on failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The tool definition advertised to the model.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with typed, already-validated arguments.
    fn call(
        &self,
        args: Self::Args,
        ctx: &ToolContext,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// Object-safe counterpart to [`Tool`], used by registries that hold
/// heterogeneous tools behind `Arc<dyn ToolDyn>`.
pub trait ToolDyn: Send + Sync {
    /// The tool's unique name.
    fn name(&self) -> &str;

    /// The tool definition advertised to the model.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with raw JSON input, deserializing and serializing
    /// at the boundary.
    fn call_dyn<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: &'a ToolContext,
    ) -> WasmBoxedFuture<'a, Result<ToolOutput, ToolError>>;
}

impl<T: Tool> ToolDyn for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn definition(&self) -> ToolDefinition {
        Tool::definition(self)
    }

    fn call_dyn<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: &'a ToolContext,
    ) -> WasmBoxedFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let args: T::Args = serde_json::from_value(input)
                .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
            match self.call(args, ctx).await {
                Ok(output) => {
                    let structured = serde_json::to_value(&output)
                        .map_err(|e| ToolError::ExecutionFailed(Box::new(e)))?;
                    Ok(ToolOutput {
                        content: vec![ContentItem::Text(structured.to_string())],
                        structured_content: Some(structured),
                        is_error: false,
                    })
                }
                Err(e) => Err(ToolError::ExecutionFailed(Box::new(e))),
            }
        })
    }
}

// --- Provider ------------------------------------------------------------

/// An LLM backend capable of completions, optionally streamed.
pub trait Provider: Send + Sync {
    /// Run a completion request to its end, returning the full response.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, ProviderError>> + WasmCompatSend;

    /// Run a completion request, returning a handle to the incremental
    /// stream of [`crate::stream::StreamEvent`]s.
    fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<StreamHandle, ProviderError>> + WasmCompatSend;
}

// --- ContextStrategy -------------------------------------------------------

/// A context-window compaction strategy.
///
/// Drives how `neuron-loop` keeps a growing conversation under a provider's
/// context window: when to compact ([`should_compact`](Self::should_compact))
/// and how ([`compact`](Self::compact)).
pub trait ContextStrategy: Send + Sync {
    /// Whether the given message history should be compacted now.
    fn should_compact(&self, messages: &[Message], token_count: usize) -> bool;

    /// Produce a compacted message history.
    fn compact(
        &self,
        messages: Vec<Message>,
    ) -> impl Future<Output = Result<Vec<Message>, ContextError>> + WasmCompatSend;

    /// Estimate the token count of the given message history.
    fn token_estimate(&self, messages: &[Message]) -> usize;
}

// --- Observability hooks ---------------------------------------------------

/// An observation/intervention point fired during the agentic loop.
///
/// Borrows from the in-flight request/response rather than cloning, so
/// hooks are cheap to fire even when none of them act.
#[derive(Debug)]
pub enum HookEvent<'a> {
    /// About to send a completion request to the provider.
    PreLlmCall {
        /// The request about to be sent.
        request: &'a CompletionRequest,
    },
    /// A completion response was received from the provider.
    PostLlmCall {
        /// The response that was received.
        response: &'a CompletionResponse,
    },
    /// About to execute a tool call.
    PreToolExecution {
        /// Name of the tool about to run.
        tool_name: &'a str,
        /// The tool's raw JSON input.
        input: &'a serde_json::Value,
    },
    /// A tool call finished executing.
    PostToolExecution {
        /// Name of the tool that ran.
        tool_name: &'a str,
        /// The tool's output.
        output: &'a ToolOutput,
    },
    /// A new iteration of the loop is starting.
    LoopIteration {
        /// The (zero-based) turn number about to run.
        turn: usize,
    },
    /// Context compaction ran.
    ContextCompaction {
        /// Estimated token count before compaction.
        old_tokens: usize,
        /// Estimated token count after compaction.
        new_tokens: usize,
    },
}

/// What a hook asks the loop to do after observing an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    /// Proceed normally.
    Continue,
    /// Stop the loop entirely, surfacing `reason`.
    Terminate {
        /// Why the loop is being terminated.
        reason: String,
    },
    /// Skip the tool call this event concerns, surfacing `reason` to the
    /// model as the tool result. Only meaningful for `PreToolExecution`.
    Skip {
        /// Why the tool call was skipped.
        reason: String,
    },
}

/// An observability/intervention hook fired at each step of the agentic loop.
pub trait ObservabilityHook: Send + Sync {
    /// React to a hook event, optionally intervening via [`HookAction`].
    fn on_event<'a>(
        &'a self,
        event: HookEvent<'a>,
    ) -> impl Future<Output = Result<HookAction, HookError>> + Send + 'a;
}

// --- Durable execution ------------------------------------------------------

/// Retry policy for a durably-executed activity.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: Option<u32>,
    /// Initial backoff between attempts.
    pub initial_interval: Option<Duration>,
}

/// Options controlling a single durably-executed activity.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Wall-clock deadline for the activity, start to close.
    pub start_to_close_timeout: Duration,
    /// Maximum gap between heartbeats before the activity is considered dead.
    pub heartbeat_timeout: Option<Duration>,
    /// Retry policy on failure. `None` means the durability engine's default.
    pub retry_policy: Option<RetryPolicy>,
}

/// A durable-execution context (Temporal, Restate, Inngest, or similar).
///
/// When set on an `AgentLoop`, LLM calls and tool executions are routed
/// through this trait instead of being invoked directly, so they can be
/// journaled and replayed after a crash.
pub trait DurableContext: Send + Sync {
    /// Durably execute a completion request.
    fn execute_llm_call(
        &self,
        request: CompletionRequest,
        options: ActivityOptions,
    ) -> impl Future<Output = Result<CompletionResponse, DurableError>> + Send;

    /// Durably execute a tool call.
    fn execute_tool(
        &self,
        tool_name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
        options: ActivityOptions,
    ) -> impl Future<Output = Result<ToolOutput, DurableError>> + Send;
}

// --- Permissions ------------------------------------------------------------

/// A policy deciding whether a tool call may proceed.
pub trait PermissionPolicy: Send + Sync {
    /// Decide whether the given tool call is permitted.
    fn check(&self, tool_name: &str, input: &serde_json::Value) -> PermissionDecision;
}

/// The result of a [`PermissionPolicy`] check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    /// The call may proceed.
    Allow,
    /// The call is rejected outright, with a reason.
    Deny(String),
    /// The call requires confirmation the policy cannot itself obtain.
    Ask(String),
}
