//! Types owned by the Pipeline Orchestrator: the committed `Turn` record,
//! its outward-facing `TurnOutcome`, and pipeline-level configuration
//! (spec.md §3, §6).

use std::time::Duration;

use chrono::{DateTime, Utc};
use neuron_executor::ExecutionResult;
use neuron_planner::ActionPlan;
use neuron_verify::Verdict;
use serde::{Deserialize, Serialize};

/// One completed interaction (spec.md §3's Turn).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Monotonic id, unique per process.
    pub id: String,
    /// The user this turn belongs to.
    pub user_id: String,
    /// When the turn was committed.
    pub timestamp: DateTime<Utc>,
    /// What the user said.
    pub utterance: String,
    /// The plan the Planner produced, if planning succeeded.
    pub plan: Option<ActionPlan>,
    /// The Verifier's verdict, if the turn reached verification.
    pub verdict: Option<Verdict>,
    /// The reply surfaced to the user.
    pub reply: String,
    /// Whether the turn's tool execution succeeded.
    pub success: bool,
}

/// What `handleTurn` returns to the caller (spec.md §6).
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The text to speak/display back to the user.
    pub reply_text: String,
    /// The verdict reached, if execution got that far.
    pub verdict: Option<Verdict>,
    /// Set when the reply was delivered in degraded mode (verifier
    /// unavailable, memory search unavailable, ...).
    pub degraded: bool,
    /// Set when this outcome is a confirmation/owner-auth prompt rather
    /// than a completed turn — the orchestrator did not commit a full
    /// `Turn` for it (spec.md §4.7 step 3).
    pub confirmation_pending: bool,
    /// The token the next call must carry in `confirmation_token` to
    /// proceed with the pending plan, present only when
    /// `confirmation_pending` is set.
    pub confirmation_token: Option<String>,
}

/// A plan awaiting a confirmation or owner-auth token, keyed by the token
/// issued in the confirmation-prompt `TurnOutcome` (spec.md §4.7 step 3,
/// §8 scenario 6).
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    /// The user who must supply the matching token.
    pub user_id: String,
    /// The plan to execute once confirmed.
    pub plan: ActionPlan,
    /// When this pending confirmation expires and is no longer honored.
    pub expires_at: DateTime<Utc>,
}

/// Orchestration-level tunables not already owned by an injected
/// collaborator's own config (spec.md §6's enumerated configuration).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// `memory.context_budget_chars` — character budget for
    /// `assembleContext`.
    pub context_budget_chars: usize,
    /// Deadline for one `Planner.plan` call.
    pub planner_deadline: Duration,
    /// Deadline for one `Verifier.check` call.
    pub verification_deadline: Duration,
    /// How long an issued confirmation token remains valid.
    pub confirmation_token_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context_budget_chars: 4096,
            planner_deadline: Duration::from_secs(10),
            verification_deadline: Duration::from_secs(10),
            confirmation_token_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// What actually happened to a tool's result, for the committed memory
/// record's text (spec.md §3: `MemoryRecord.utterance`/`reply` pairing).
#[must_use]
pub fn summarize_result(result: &ExecutionResult) -> String {
    if result.success {
        result.value.to_string()
    } else {
        result.error_message.clone().unwrap_or_else(|| "execution failed".to_string())
    }
}
