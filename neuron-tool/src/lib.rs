#![deny(missing_docs)]
//! Tool registry with a composable middleware pipeline for LLM function calling.
//!
//! Tools implement [`neuron_types::Tool`] (or the object-safe
//! [`neuron_types::ToolDyn`] directly for non-Rust-native sources like MCP
//! servers) and are collected in a [`registry::ToolRegistry`]. Cross-cutting
//! concerns — permission checks, schema validation, timeouts, output
//! formatting, structured-output retries — are expressed as
//! [`middleware::ToolMiddleware`] in the same style as axum's `from_fn`.

pub mod builtin;
pub mod builtin_specs;
pub mod middleware;
pub mod registry;
pub mod spec;

pub use builtin::{
    OutputFormatter, PermissionChecker, RetryLimitedValidator, SchemaValidator,
    StructuredOutputValidator, TimeoutMiddleware,
};
pub use builtin_specs::{builtin_specs, register_builtin_specs};
pub use middleware::{tool_middleware_fn, Next, ToolCall, ToolMiddleware};
pub use registry::ToolRegistry;
pub use spec::{ArgSchema, RateLimitClass, RiskTier, SideEffect, ToolSpec, ToolSpecError, ToolSpecRegistry};
