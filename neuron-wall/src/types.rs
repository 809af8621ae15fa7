//! Types shared across the Wall's tiers.

use serde::{Deserialize, Serialize};

/// Which of the five tiers produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Tier 1 — argument re-validation against the tool's schema.
    Schema,
    /// Tier 2 — rate limits, domain/path allow-lists, side-effect gating.
    Policy,
    /// Tier 3 — deny-list lint over code-like arguments.
    StaticAnalysis,
    /// Tier 4 — risk-tier-driven confirmation/owner-auth requirement.
    AuditDecision,
    /// Tier 5 — audit log write. Never rejects on its own.
    RiskGating,
}

/// The Wall's final decision for one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WallVerdict {
    /// The plan may execute as-is.
    Approved,
    /// A `confirm`-tier tool was planned without a confirmation token.
    /// Not an error — the orchestrator must prompt the user and re-submit.
    NeedsConfirmation {
        /// Why confirmation is required (usually the tool name and risk tier).
        reason: String,
    },
    /// An `owner-root`-tier tool was planned without a valid owner token.
    NeedsOwnerAuth,
    /// The plan was rejected outright.
    Rejected {
        /// Which tier rejected it.
        tier: Tier,
        /// A short machine-readable code (`rate_limited`, `fs_outside_root`, ...).
        code: String,
        /// Human-readable detail.
        detail: String,
    },
}

impl WallVerdict {
    /// True if this verdict allows execution to proceed.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, WallVerdict::Approved)
    }

    /// The tier that produced this verdict, for audit logging. `None` for
    /// `Approved` (tier 5 still runs and is recorded separately).
    #[must_use]
    pub fn rejecting_tier(&self) -> Option<Tier> {
        match self {
            WallVerdict::Rejected { tier, .. } => Some(*tier),
            _ => None,
        }
    }
}

/// Per-risk-tier rate limit: `limit` requests per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Maximum requests within `window`.
    pub limit: u32,
    /// Window duration.
    pub window: std::time::Duration,
}

/// `wall.rate_limits`: default 50/min (safe), 20/min (review), 5/5-min
/// (confirm), 2/hour (owner-root) — spec.md §4.4.
#[derive(Debug, Clone)]
pub struct RateLimitTable {
    /// Limit for `RiskTier::Safe`.
    pub safe: RateLimit,
    /// Limit for `RiskTier::Review`.
    pub review: RateLimit,
    /// Limit for `RiskTier::Confirm`.
    pub confirm: RateLimit,
    /// Limit for `RiskTier::OwnerRoot`.
    pub owner_root: RateLimit,
}

impl Default for RateLimitTable {
    fn default() -> Self {
        use std::time::Duration;
        Self {
            safe: RateLimit {
                limit: 50,
                window: Duration::from_secs(60),
            },
            review: RateLimit {
                limit: 20,
                window: Duration::from_secs(60),
            },
            confirm: RateLimit {
                limit: 5,
                window: Duration::from_secs(5 * 60),
            },
            owner_root: RateLimit {
                limit: 2,
                window: Duration::from_secs(60 * 60),
            },
        }
    }
}

impl RateLimitTable {
    /// Look up the limit for a given risk tier.
    #[must_use]
    pub fn for_tier(&self, tier: neuron_tool::RiskTier) -> RateLimit {
        use neuron_tool::RiskTier;
        match tier {
            RiskTier::Safe => self.safe,
            RiskTier::Review => self.review,
            RiskTier::Confirm => self.confirm,
            RiskTier::OwnerRoot => self.owner_root,
        }
    }
}

/// Policy configuration consumed by tier 2 (spec.md §6's `wall.*` keys).
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Per-risk-tier rate limit table.
    pub rate_limits: RateLimitTable,
    /// Domains permitted for tools with URL arguments. Empty = no allowlist
    /// enforced (only the blocklist applies).
    pub allowlist_domains: Vec<String>,
    /// Domains never permitted, checked before the allowlist.
    pub blocklist_domains: Vec<String>,
    /// Root directory filesystem tools are confined to.
    pub fs_root: std::path::PathBuf,
    /// File extensions filesystem tools may never touch.
    pub fs_denied_extensions: Vec<String>,
    /// Maximum file size (bytes) filesystem tools may write.
    pub fs_max_bytes: u64,
    /// Tools explicitly permitted to carry a `network` or `os-control`
    /// side effect (spec.md §4.4's "network and os-control require
    /// per-tool policy entries; missing entry ⇒ reject"). A tool with
    /// either side effect and no entry here is rejected by tier 2
    /// regardless of its risk tier.
    pub side_effect_entries: std::collections::HashSet<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            rate_limits: RateLimitTable::default(),
            allowlist_domains: Vec::new(),
            blocklist_domains: Vec::new(),
            fs_root: std::path::PathBuf::from("/var/lib/neuron-cortex/scratch"),
            fs_denied_extensions: vec!["exe".into(), "sh".into(), "so".into()],
            fs_max_bytes: 10 * 1024 * 1024,
            side_effect_entries: ["get_weather", "search_web", "research", "run_shell"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// One row of a [`crate::audit::AuditRecord`]'s `wall_tiers` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierOutcome {
    /// Which tier.
    pub tier: Tier,
    /// `"pass"`, `"rejected"`, `"needs_confirmation"`, `"needs_owner_auth"`.
    pub outcome: String,
    /// Machine-readable code, present only on rejection.
    pub code: Option<String>,
}
