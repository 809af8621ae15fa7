//! Pipeline Orchestrator: sequences a turn through Memory, the Planner,
//! the Validation Wall, the Sandbox Executor, and the Verifier, and
//! selects the reply the user hears (spec.md §4.7).

pub mod error;
pub mod pipeline;
pub mod reply;
pub mod types;

pub use error::OrchestratorError;
pub use pipeline::Pipeline;
pub use types::{PendingConfirmation, PipelineConfig, Turn, TurnOutcome};
