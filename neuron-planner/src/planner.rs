//! [`Planner`]: composes a primary and fallback [`PlanStrategy`].

use std::sync::Arc;

use neuron_memory::ContextBundle;
use neuron_tool::ToolSpecRegistry;
use tracing::warn;

use crate::error::PlanError;
use crate::strategy::PlanStrategy;
use crate::types::ActionPlan;

/// Turns `(utterance, context)` into an [`ActionPlan`] by trying a primary
/// strategy and falling back to a secondary one on failure.
///
/// spec.md §4.3: "the fallback is silent to the user — only logged."
pub struct Planner {
    primary: Arc<dyn PlanStrategy>,
    fallback: Option<Arc<dyn PlanStrategy>>,
    registry: Arc<ToolSpecRegistry>,
}

impl Planner {
    /// Construct a planner with a primary strategy and no fallback.
    #[must_use]
    pub fn new(primary: Arc<dyn PlanStrategy>, registry: Arc<ToolSpecRegistry>) -> Self {
        Self {
            primary,
            fallback: None,
            registry,
        }
    }

    /// Attach a fallback strategy, tried only if the primary fails.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn PlanStrategy>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Produce a plan for `utterance`, given the assembled `context`.
    ///
    /// Tries `primary` first. On any [`crate::error::StrategyError`], logs
    /// the failure and tries `fallback` if one is configured. If both fail
    /// (or there is no fallback), returns [`PlanError::PlanningFailure`].
    pub async fn plan(
        &self,
        utterance: &str,
        context: &ContextBundle,
    ) -> Result<ActionPlan, PlanError> {
        match self.primary.plan(utterance, context, &self.registry).await {
            Ok(plan) => return self.validate(plan),
            Err(e) => {
                warn!(
                    strategy = self.primary.name(),
                    error = %e,
                    "primary plan strategy failed, attempting fallback"
                );
            }
        }

        let Some(fallback) = &self.fallback else {
            return Err(PlanError::PlanningFailure(
                "primary strategy failed and no fallback configured".to_string(),
            ));
        };

        match fallback.plan(utterance, context, &self.registry).await {
            Ok(plan) => self.validate(plan),
            Err(e) => Err(PlanError::PlanningFailure(format!(
                "fallback strategy '{}' also failed: {e}",
                fallback.name()
            ))),
        }
    }

    /// Defensive re-check that the plan names a known tool with valid args
    /// (spec.md §4.3: "should be unreachable under a correctly regenerated
    /// grammar but checked defensively").
    fn validate(&self, plan: ActionPlan) -> Result<ActionPlan, PlanError> {
        let spec = self
            .registry
            .lookup(&plan.tool_name)
            .ok_or_else(|| PlanError::UnknownTool(plan.tool_name.clone()))?;
        spec.arg_schema
            .validate(&plan.args)
            .map_err(|detail| PlanError::InvalidArgs {
                tool: plan.tool_name.clone(),
                detail,
            })?;
        Ok(plan)
    }
}
