//! Sandbox Executor: registry-based tool dispatch under resource and
//! capability limits (spec.md §4.5).

pub mod builtin;
pub mod calc;
pub mod error;
pub mod executor;
pub mod handler;
pub mod scratch;
pub mod types;

pub use error::ExecutorError;
pub use executor::{Executor, ExecutorConfig};
pub use handler::ToolHandler;
pub use scratch::ScratchDir;
pub use types::{
    Capability, CitationRef, ExecutionContext, ExecutionErrorKind, ExecutionResult, ResourceCaps,
    SideEffectEntry,
};
