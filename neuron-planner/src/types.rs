//! [`ActionPlan`]: the planner's single output type.

use serde::{Deserialize, Serialize};

/// The planner's output: exactly one tool invocation. No implicit chains —
/// a plan names one tool and the arguments to call it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    /// The tool to invoke. Must name a registered [`neuron_tool::ToolSpec`].
    pub tool_name: String,
    /// Arguments, constrained by the tool's argument schema.
    #[serde(default)]
    pub args: serde_json::Value,
    /// Optional metadata: risk hint, reasoning trace, referenced citations.
    #[serde(default)]
    pub meta: ActionPlanMeta,
}

/// Optional metadata attached to an [`ActionPlan`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPlanMeta {
    /// The strategy's own estimate of this plan's risk, if it has one.
    /// Informational only — the wall's Audit Decision tier (spec.md §4.4)
    /// is authoritative and consults the registry, not this hint.
    #[serde(default)]
    pub risk_hint: Option<String>,
    /// Free-text reasoning trace, if the strategy produced one (e.g. a
    /// model's chain of thought summary). Never required for execution.
    #[serde(default)]
    pub reasoning_trace: Option<String>,
    /// Citation content hashes the plan's reasoning referenced, if any.
    #[serde(default)]
    pub citations: Vec<String>,
}

impl ActionPlan {
    /// Construct a plan with no metadata.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            meta: ActionPlanMeta::default(),
        }
    }
}
