//! [`Pipeline`]: sequences one turn end to end (spec.md §4.7).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use neuron_memory::{EmbeddingModel, MemoryBackend, MemoryService};
use neuron_planner::Planner;
use neuron_tool::ToolSpecRegistry;
use neuron_verify::{EntailmentModel, Status, Verifier};
use neuron_wall::{Wall, WallContext, WallVerdict};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::OrchestratorError;
use crate::reply::{blocked_reply, refusal_reply, tool_success_reply, warn_reply};
use crate::types::{PendingConfirmation, PipelineConfig, TurnOutcome};

/// The Pipeline Orchestrator: owns one of each stage and sequences a turn
/// through all of them.
///
/// Generic over the concrete memory backend, embedder, and entailment
/// model an operator wires in at startup — the Planner, Wall, and
/// Executor are already concrete (they hide their own collaborators
/// behind `Arc<dyn Trait>`), so only Memory and Verifier carry type
/// parameters here.
pub struct Pipeline<B, ME, EN>
where
    B: MemoryBackend,
    ME: EmbeddingModel,
    EN: EntailmentModel,
{
    memory: MemoryService<B, ME>,
    planner: Planner,
    wall: Wall,
    executor: neuron_executor::Executor,
    verifier: Verifier<EN>,
    registry: Arc<ToolSpecRegistry>,
    config: PipelineConfig,
    pending: AsyncMutex<HashMap<String, PendingConfirmation>>,
    user_locks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<B, ME, EN> Pipeline<B, ME, EN>
where
    B: MemoryBackend,
    ME: EmbeddingModel,
    EN: EntailmentModel,
{
    /// Assemble a pipeline from its five already-constructed stages plus
    /// the frozen tool registry they share.
    ///
    /// There is deliberately no builder here for live reconfiguration:
    /// per spec.md §9 "configuration is one immutable record passed at
    /// startup", `registerTool`/`setPolicy` are accomplished by building
    /// the registry and `PolicyConfig` the caller passes into
    /// [`Wall::new`]/[`neuron_tool::ToolSpecRegistry::register`] before
    /// this constructor runs, not by mutating a running `Pipeline`.
    #[must_use]
    pub fn new(
        memory: MemoryService<B, ME>,
        planner: Planner,
        wall: Wall,
        executor: neuron_executor::Executor,
        verifier: Verifier<EN>,
        registry: Arc<ToolSpecRegistry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            memory,
            planner,
            wall,
            executor,
            verifier,
            registry,
            config,
            pending: AsyncMutex::new(HashMap::new()),
            user_locks: AsyncMutex::new(HashMap::new()),
        }
    }

    async fn lock_for_user(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Run one turn to completion: plan, validate, execute, verify,
    /// select a reply, and commit to memory (spec.md §4.7's eight steps).
    ///
    /// Holds an advisory per-user lock for the whole call so a single
    /// user's turns are totally ordered while different users proceed
    /// independently (spec.md §5).
    ///
    /// `cancellation` is the caller's handle for barge-in/timeout
    /// cancellation (spec.md §4.7/§5: "cancellation of the turn ...
    /// propagates through the ExecutionContext cancellation handle").
    /// Pass `None` to let the turn run uncancellable.
    ///
    /// # Errors
    /// Returns [`OrchestratorError`] only for infrastructure failures that
    /// must abort the turn outright (an unauditable action, a malformed
    /// post-condition registration). Ordinary refusals, rejections, and
    /// degraded verification all surface as a normal `Ok(TurnOutcome)`.
    pub async fn handle_turn(
        &self,
        user_id: &str,
        utterance: &str,
        confirmation_token: Option<String>,
        owner_token: Option<Arc<neuron_auth::AuthToken>>,
        cancellation: Option<CancellationToken>,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let user_lock = self.lock_for_user(user_id).await;
        let _guard = user_lock.lock().await;
        let turn_id = uuid::Uuid::new_v4().to_string();
        let cancellation = cancellation.unwrap_or_else(CancellationToken::new);

        // Step 3 (confirmation branch): if the caller presented a token
        // matching a pending confirmation, resume with the plan that was
        // parked rather than re-planning from the utterance.
        let resumed_plan = if let Some(token) = &confirmation_token {
            let mut pending = self.pending.lock().await;
            match pending.remove(token) {
                Some(entry) if entry.user_id == user_id && entry.expires_at > Utc::now() => Some(entry.plan),
                Some(_) => None,
                None => None,
            }
        } else {
            None
        };
        // The Wall trusts the orchestrator's say on whether a presented
        // token was actually honored — only a token that resolved a real
        // pending confirmation counts as valid, never merely "present".
        let confirmation_valid = resumed_plan.is_some();

        let plan = match resumed_plan {
            Some(plan) => plan,
            None => {
                // Step 1: assemble context.
                let context = self
                    .memory
                    .assemble_context(user_id, utterance, self.config.context_budget_chars)
                    .await
                    .map_err(|e| OrchestratorError::Memory(e.to_string()))?;

                // Step 2: plan.
                match self.planner.plan(utterance, &context).await {
                    Ok(plan) => plan,
                    Err(e) => {
                        warn!(user_id, error = %e, "planning failed, refusing turn");
                        let reply = refusal_reply("planning_failure");
                        self.commit_turn(user_id, utterance, None, None, &reply, false).await;
                        return Ok(TurnOutcome {
                            reply_text: reply,
                            verdict: None,
                            degraded: false,
                            confirmation_pending: false,
                            confirmation_token: None,
                        });
                    }
                }
            }
        };

        // Step 3: validate.
        let wall_ctx = WallContext {
            confirmation_token: confirmation_token.clone(),
            confirmation_valid,
            owner_token: owner_token.clone(),
        };
        let verdict = self.wall.evaluate(user_id, &turn_id, &plan, &wall_ctx).await?;

        match verdict {
            WallVerdict::Rejected { code, .. } => {
                let reply = refusal_reply(&code);
                self.commit_turn(user_id, utterance, Some(&plan), None, &reply, false).await;
                return Ok(TurnOutcome {
                    reply_text: reply,
                    verdict: None,
                    degraded: false,
                    confirmation_pending: false,
                    confirmation_token: None,
                });
            }
            WallVerdict::NeedsConfirmation { .. } | WallVerdict::NeedsOwnerAuth => {
                let token = uuid::Uuid::new_v4().to_string();
                let expires_at = Utc::now()
                    + ChronoDuration::from_std(self.config.confirmation_token_ttl)
                        .unwrap_or_else(|_| ChronoDuration::minutes(5));
                self.pending.lock().await.insert(
                    token.clone(),
                    PendingConfirmation { user_id: user_id.to_string(), plan, expires_at },
                );
                return Ok(TurnOutcome {
                    reply_text: "This action needs your confirmation before I proceed. Reply to confirm.".to_string(),
                    verdict: None,
                    degraded: false,
                    confirmation_pending: true,
                    confirmation_token: Some(token),
                });
            }
            WallVerdict::Approved => {}
        }

        let Some(spec) = self.registry.lookup(&plan.tool_name) else {
            return Err(OrchestratorError::Memory(format!("tool '{}' vanished after approval", plan.tool_name)));
        };

        // Step 4: execute.
        let result = self
            .executor
            .execute(&plan.tool_name, &plan.args, spec.side_effect, user_id, &turn_id, cancellation.clone())
            .await?;

        if result.cancelled {
            info!(user_id, turn_id, "turn cancelled, no memory commit");
            return Ok(TurnOutcome {
                reply_text: String::new(),
                verdict: None,
                degraded: false,
                confirmation_pending: false,
                confirmation_token: None,
            });
        }

        // Step 5: verify.
        let vdt = self.verifier.check_for_tool(&spec, &plan.args, &result).await?;

        // Step 6: select reply text.
        let degraded = vdt.reasons.iter().any(|r| matches!(r, neuron_verify::ReasonCode::VerifierDegraded));
        let reply = if result.success && vdt.status == Status::Pass {
            tool_success_reply(&plan.tool_name, &result)
        } else if result.success && vdt.status == Status::Warn {
            warn_reply(&tool_success_reply(&plan.tool_name, &result), &vdt)
        } else if !result.success {
            refusal_reply(result.error_kind.map(|k| format!("{k:?}")).as_deref().unwrap_or("execution_failed"))
        } else {
            blocked_reply(&vdt)
        };

        // Step 7: commit.
        self.commit_turn(user_id, utterance, Some(&plan), Some(&result), &reply, result.success).await;

        // Step 8: return.
        Ok(TurnOutcome {
            reply_text: reply,
            verdict: Some(vdt),
            degraded,
            confirmation_pending: false,
            confirmation_token: None,
        })
    }

    async fn commit_turn(
        &self,
        user_id: &str,
        utterance: &str,
        plan: Option<&neuron_planner::ActionPlan>,
        result: Option<&neuron_executor::ExecutionResult>,
        reply: &str,
        success: bool,
    ) {
        let text = match (plan, result) {
            (Some(plan), Some(result)) => {
                format!("{utterance} => {}: {}", plan.tool_name, crate::types::summarize_result(result))
            }
            (Some(plan), None) => format!("{utterance} => {} rejected", plan.tool_name),
            _ => format!("{utterance} => {reply}"),
        };
        let high_risk = plan.is_some_and(|p| {
            self.registry.lookup(&p.tool_name).is_some_and(|s| s.risk_tier.at_least_review())
        });
        let tool_name = plan.map(|p| p.tool_name.clone());
        if let Err(e) = self.memory.commit(user_id, &text, success, high_risk, None, tool_name).await {
            warn!(user_id, error = %e, "memory commit failed after turn");
        }
    }

    /// Rotate the audit log (spec.md §6's `rotateAuditLog()` admin
    /// surface). Unlike `registerTool`/`setPolicy`, this is a genuine
    /// runtime operation, not a startup-time configuration concern.
    pub async fn rotate_audit_log(&self) -> Result<(), OrchestratorError> {
        self.wall.audit_log().rotate().await?;
        Ok(())
    }

    /// Remove one memory by id (spec.md §6's `memory.forget(user_id, id)`).
    pub async fn forget(&self, user_id: &str, id: &str) -> Result<usize, OrchestratorError> {
        let removed = self.memory.forget(user_id, id).await.map_err(|e| OrchestratorError::Memory(e.to_string()))?;
        Ok(if removed { 1 } else { 0 })
    }

    /// Remove every memory matching `query` above the forget floor
    /// (spec.md §6's `memory.forget(user_id, query)`).
    pub async fn forget_matching(&self, user_id: &str, query: &str) -> Result<usize, OrchestratorError> {
        self.memory.forget_matching(user_id, query).await.map_err(|e| OrchestratorError::Memory(e.to_string()))
    }

    /// The user's aggregate profile (spec.md §6's `memory.profile(user_id)`).
    pub async fn profile(&self, user_id: &str) -> Result<neuron_memory::UserProfile, OrchestratorError> {
        self.memory.profile(user_id).await.map_err(|e| OrchestratorError::Memory(e.to_string()))
    }

    /// List registered tools matching a predicate (spec.md §6's
    /// `registry.list(filter)`).
    pub fn list_tools(
        &self,
        predicate: impl Fn(&neuron_tool::ToolSpec) -> bool,
    ) -> Vec<std::sync::Arc<neuron_tool::ToolSpec>> {
        self.registry.list(predicate)
    }
}
