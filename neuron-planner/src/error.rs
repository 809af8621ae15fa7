//! Errors produced by the planner.

use thiserror::Error;

/// Errors from a single [`crate::strategy::PlanStrategy`] attempt.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The strategy's output did not parse as an [`crate::types::ActionPlan`].
    #[error("could not parse plan: {0}")]
    ParseFailure(String),

    /// The underlying collaborator (model, classifier) could not be reached.
    #[error("strategy unavailable: {0}")]
    Unavailable(String),

    /// No pattern in a rule-based strategy matched the utterance.
    #[error("no rule matched utterance")]
    NoMatch,

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from [`crate::planner::Planner::plan`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PlanError {
    /// Neither the primary nor the fallback strategy produced a plan.
    #[error("planning failed: {0}")]
    PlanningFailure(String),

    /// A strategy emitted a plan naming a tool the registry doesn't know
    /// about. Should be unreachable under a correctly regenerated grammar
    /// but checked defensively (spec.md §4.3).
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The chosen tool's arguments didn't satisfy its schema even after
    /// parsing succeeded.
    #[error("args for tool '{tool}' failed schema validation: {detail}")]
    InvalidArgs {
        /// The tool whose schema rejected the args.
        tool: String,
        /// Why the schema check failed.
        detail: String,
    },
}
