//! [`Wall`]: the five-tier validation pipeline (spec.md §4.4).

use std::sync::Arc;

use chrono::Utc;
use neuron_auth::AuthToken;
use neuron_planner::ActionPlan;
use neuron_tool::{RiskTier, SideEffect, ToolSpecRegistry};
use tracing::{info, warn};

use crate::audit::{redact_args, AuditLog, AuditRecord};
use crate::error::WallError;
use crate::rate_limit::RateLimiter;
use crate::static_analysis::{lint_shell_like, lint_sql_read_only};
use crate::types::{PolicyConfig, Tier, TierOutcome, WallVerdict};

/// Per-call context the orchestrator supplies alongside a plan — the
/// pieces of turn state the Wall needs but does not own.
#[derive(Debug, Clone, Default)]
pub struct WallContext {
    /// Confirmation token carried on this turn, if the user is responding
    /// to a prior `NeedsConfirmation` prompt.
    pub confirmation_token: Option<String>,
    /// Whether `confirmation_token` (if present) is valid for this plan.
    /// The orchestrator is the source of truth for token validity; the
    /// Wall only asks whether one was supplied and accepted.
    pub confirmation_valid: bool,
    /// Pre-authenticated owner token, required for `owner-root` tier.
    pub owner_token: Option<Arc<AuthToken>>,
}

/// The five-tier Validation Wall.
pub struct Wall {
    registry: Arc<ToolSpecRegistry>,
    policy: PolicyConfig,
    rate_limiter: RateLimiter,
    audit_log: Arc<AuditLog>,
}

impl Wall {
    /// Construct a Wall over the live tool registry, policy configuration,
    /// and audit log.
    #[must_use]
    pub fn new(registry: Arc<ToolSpecRegistry>, policy: PolicyConfig, audit_log: Arc<AuditLog>) -> Self {
        let rate_limiter = RateLimiter::new(policy.rate_limits.clone());
        Self {
            registry,
            policy,
            rate_limiter,
            audit_log,
        }
    }

    /// The underlying audit log, for operational calls like rotation that
    /// belong to the orchestrator's admin surface rather than evaluation.
    #[must_use]
    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit_log
    }

    /// Evaluate one plan for `user_id` in `turn_id`, running all five
    /// tiers in order. Always writes an audit record (tier 5), even when
    /// an earlier tier rejected.
    pub async fn evaluate(
        &self,
        user_id: &str,
        turn_id: &str,
        plan: &ActionPlan,
        ctx: &WallContext,
    ) -> Result<WallVerdict, WallError> {
        let spec = self
            .registry
            .lookup(&plan.tool_name)
            .ok_or_else(|| WallError::UnknownTool(plan.tool_name.clone()))?;

        let mut tiers = Vec::new();

        // Tier 1: Schema.
        if let Err(detail) = spec.arg_schema.validate(&plan.args) {
            tiers.push(TierOutcome {
                tier: Tier::Schema,
                outcome: "rejected".into(),
                code: Some("schema_violation".into()),
            });
            let verdict = WallVerdict::Rejected {
                tier: Tier::Schema,
                code: "schema_violation".into(),
                detail,
            };
            self.write_audit(turn_id, user_id, &plan.tool_name, &plan.args, &tiers, &verdict)
                .await?;
            return Ok(verdict);
        }
        tiers.push(TierOutcome {
            tier: Tier::Schema,
            outcome: "pass".into(),
            code: None,
        });

        // Tier 2: Policy.
        if let Some((code, detail)) = self.check_policy(user_id, &plan.tool_name, &spec, &plan.args) {
            tiers.push(TierOutcome {
                tier: Tier::Policy,
                outcome: "rejected".into(),
                code: Some(code.clone()),
            });
            let verdict = WallVerdict::Rejected {
                tier: Tier::Policy,
                code,
                detail,
            };
            self.write_audit(turn_id, user_id, &plan.tool_name, &plan.args, &tiers, &verdict)
                .await?;
            return Ok(verdict);
        }
        tiers.push(TierOutcome {
            tier: Tier::Policy,
            outcome: "pass".into(),
            code: None,
        });

        // Tier 3: Static Analysis.
        if let Some(pattern) = self.check_static_analysis(&plan.tool_name, &plan.args) {
            tiers.push(TierOutcome {
                tier: Tier::StaticAnalysis,
                outcome: "rejected".into(),
                code: Some("lint_violation".into()),
            });
            let verdict = WallVerdict::Rejected {
                tier: Tier::StaticAnalysis,
                code: "lint_violation".into(),
                detail: pattern,
            };
            self.write_audit(turn_id, user_id, &plan.tool_name, &plan.args, &tiers, &verdict)
                .await?;
            return Ok(verdict);
        }
        tiers.push(TierOutcome {
            tier: Tier::StaticAnalysis,
            outcome: "pass".into(),
            code: None,
        });

        // Tier 4: Audit Decision.
        let decision = self.audit_decision(spec.risk_tier, ctx);
        match &decision {
            WallVerdict::NeedsConfirmation { .. } => {
                tiers.push(TierOutcome {
                    tier: Tier::AuditDecision,
                    outcome: "needs_confirmation".into(),
                    code: None,
                });
            }
            WallVerdict::NeedsOwnerAuth => {
                tiers.push(TierOutcome {
                    tier: Tier::AuditDecision,
                    outcome: "needs_owner_auth".into(),
                    code: None,
                });
            }
            _ => {
                tiers.push(TierOutcome {
                    tier: Tier::AuditDecision,
                    outcome: "pass".into(),
                    code: None,
                });
            }
        }

        let final_verdict = if matches!(decision, WallVerdict::Approved) {
            WallVerdict::Approved
        } else {
            decision
        };

        // Tier 5: Risk Gating / Audit Log. Never rejects on its own.
        self.write_audit(turn_id, user_id, &plan.tool_name, &plan.args, &tiers, &final_verdict)
            .await?;

        info!(
            tool = %plan.tool_name,
            user_id,
            verdict = ?final_verdict,
            "wall decision"
        );

        Ok(final_verdict)
    }

    fn check_policy(
        &self,
        user_id: &str,
        tool_name: &str,
        spec: &neuron_tool::ToolSpec,
        args: &serde_json::Value,
    ) -> Option<(String, String)> {
        if !self.rate_limiter.try_acquire(user_id, spec.risk_tier) {
            return Some((
                "rate_limited".into(),
                format!("rate limit exceeded for tool '{tool_name}' at tier {:?}", spec.risk_tier),
            ));
        }

        match spec.side_effect {
            SideEffect::Network => {
                if let Some(violation) = self.check_side_effect_entry(tool_name, "network") {
                    return Some(violation);
                }
                if let Some(url) = extract_url(args) {
                    if let Some(host) = url_host(&url) {
                        if self.policy.blocklist_domains.iter().any(|d| host.ends_with(d.as_str())) {
                            return Some(("domain_blocked".into(), format!("domain blocked: {host}")));
                        }
                        if !self.policy.allowlist_domains.is_empty()
                            && !self.policy.allowlist_domains.iter().any(|d| host.ends_with(d.as_str()))
                        {
                            return Some(("domain_not_allowed".into(), format!("domain not allowlisted: {host}")));
                        }
                    }
                }
            }
            SideEffect::OsControl => {
                if let Some(violation) = self.check_side_effect_entry(tool_name, "os-control") {
                    return Some(violation);
                }
            }
            SideEffect::WritesFs | SideEffect::ReadOnly => {
                if let Some(path) = extract_path(args) {
                    if let Some(violation) = self.check_fs_policy(&path) {
                        return Some(violation);
                    }
                }
            }
            SideEffect::MemoryWrite => {}
        }

        None
    }

    /// Tier 2 side-effect gating (spec.md §4.4): `network` and `os-control`
    /// tools require an explicit entry in `policy.side_effect_entries`; a
    /// tool with neither is rejected outright.
    fn check_side_effect_entry(&self, tool_name: &str, side_effect: &str) -> Option<(String, String)> {
        if self.policy.side_effect_entries.contains(tool_name) {
            None
        } else {
            Some((
                "policy_violation".into(),
                format!("tool '{tool_name}' has a {side_effect} side effect but no policy entry"),
            ))
        }
    }

    fn check_fs_policy(&self, path: &str) -> Option<(String, String)> {
        let p = std::path::Path::new(path);
        if p.is_absolute() && !p.starts_with(&self.policy.fs_root) {
            return Some((
                "fs_outside_root".into(),
                format!("path {path} is outside the configured root {:?}", self.policy.fs_root),
            ));
        }
        if let Some(ext) = p.extension().and_then(|e| e.to_str()) {
            if self.policy.fs_denied_extensions.iter().any(|d| d == ext) {
                return Some(("fs_denied_extension".into(), format!("extension '{ext}' is denied")));
            }
        }
        None
    }

    fn check_static_analysis(&self, tool_name: &str, args: &serde_json::Value) -> Option<String> {
        if let Some(command) = args.get("command").and_then(|v| v.as_str()) {
            if let Err(v) = lint_shell_like(command) {
                return Some(v.0);
            }
        }
        if let Some(query) = args.get("query").and_then(|v| v.as_str()) {
            if tool_name.contains("sql") || tool_name.contains("db") {
                if let Err(v) = lint_sql_read_only(query) {
                    return Some(v.0);
                }
            }
        }
        None
    }

    fn audit_decision(&self, risk_tier: RiskTier, ctx: &WallContext) -> WallVerdict {
        match risk_tier {
            RiskTier::Safe => WallVerdict::Approved,
            RiskTier::Review => WallVerdict::Approved,
            RiskTier::Confirm => {
                if ctx.confirmation_token.is_some() && ctx.confirmation_valid {
                    WallVerdict::Approved
                } else {
                    WallVerdict::NeedsConfirmation {
                        reason: "this action requires explicit confirmation".into(),
                    }
                }
            }
            RiskTier::OwnerRoot => {
                let has_owner_token = ctx.owner_token.as_ref().is_some_and(|t| !t.is_expired());
                let has_confirmation = ctx.confirmation_token.is_some() && ctx.confirmation_valid;
                if has_owner_token && has_confirmation {
                    WallVerdict::Approved
                } else {
                    WallVerdict::NeedsOwnerAuth
                }
            }
        }
    }

    async fn write_audit(
        &self,
        turn_id: &str,
        user_id: &str,
        tool: &str,
        args: &serde_json::Value,
        tiers: &[TierOutcome],
        verdict: &WallVerdict,
    ) -> Result<(), WallError> {
        let args_digest = redact_args(args).await;
        let record = AuditRecord {
            ts: Utc::now(),
            turn_id: turn_id.to_string(),
            user_id: user_id.to_string(),
            tool: tool.to_string(),
            args_digest,
            wall_tiers: tiers.to_vec(),
            verdict_summary: format!("{verdict:?}"),
        };
        if let Err(e) = self.audit_log.append(&record).await {
            warn!(error = %e, "audit write failed, escalating");
            return Err(e);
        }
        Ok(())
    }
}

fn extract_url(args: &serde_json::Value) -> Option<String> {
    args.get("url")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn extract_path(args: &serde_json::Value) -> Option<String> {
    args.get("path")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn url_host(url: &str) -> Option<String> {
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    let host = without_scheme.split('/').next().unwrap_or(without_scheme);
    Some(host.split(':').next().unwrap_or(host).to_string())
}
