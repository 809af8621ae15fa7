//! [`Verifier`]: combines the post-condition and claim/citation
//! sub-verifiers into one `Verdict` (spec.md §4.6).

use std::collections::HashSet;

use neuron_executor::{CitationRef, ExecutionResult};
use tracing::warn;

use crate::claims::split_into_claims;
use crate::entailment::EntailmentModel;
use crate::error::VerifierError;
use crate::postcondition::PostConditionTable;
use crate::types::{ReasonCode, Status, Verdict};

/// Extracts the textual claims a tool's result makes, for tools whose
/// output includes prose a user might mistake for a grounded fact.
fn extract_claim_text(tool_name: &str, result: &ExecutionResult) -> Option<String> {
    match tool_name {
        "research" => result.value.get("answer").and_then(|v| v.as_str()).map(str::to_string),
        "search_web" => result.value.get("results").and_then(|v| v.as_array()).map(|hits| {
            hits.iter()
                .filter_map(|h| h.get("snippet").and_then(|s| s.as_str()))
                .collect::<Vec<_>>()
                .join(". ")
        }),
        "recall_memory" => result.value.get("memories").and_then(|v| v.as_array()).map(|hits| {
            hits.iter()
                .filter_map(|h| h.get("text").and_then(|s| s.as_str()))
                .collect::<Vec<_>>()
                .join(". ")
        }),
        _ => None,
    }
}

/// Per-tool coverage thresholds, configuration knobs, and the claim-bearing
/// tool set (spec.md §4.6 and §6's `verifier.*` keys).
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Minimum entailment score for a claim to count as supported.
    pub entailment_floor: f32,
    /// Batch size for entailment scoring requests.
    pub batch_size: usize,
    /// Coverage below this fraction blocks the turn.
    pub coverage_block_floor: f32,
    /// Coverage below this fraction (but at/above `coverage_block_floor`)
    /// warns rather than blocks.
    pub coverage_warn_floor: f32,
    /// Tool names whose output carries textual claims subject to
    /// claim/citation verification. Everything else is skipped by the
    /// claim sub-verifier (spec.md §4.6: "tools without textual claims:
    /// skipped").
    pub claim_bearing_tools: HashSet<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            entailment_floor: 0.6,
            batch_size: 16,
            coverage_block_floor: 0.5,
            coverage_warn_floor: 0.8,
            claim_bearing_tools: ["research", "search_web", "recall_memory"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// The Verifier, generic over its injected entailment collaborator.
pub struct Verifier<E: EntailmentModel> {
    post_conditions: PostConditionTable,
    entailment: E,
    config: VerifierConfig,
}

impl<E: EntailmentModel> Verifier<E> {
    /// Build a verifier with the default post-condition table.
    #[must_use]
    pub fn new(entailment: E, config: VerifierConfig) -> Self {
        Self { post_conditions: PostConditionTable::default(), entailment, config }
    }

    /// Override the post-condition table (e.g. to add a predicate for a
    /// tool registered via `registerTool`).
    #[must_use]
    pub fn with_post_conditions(mut self, table: PostConditionTable) -> Self {
        self.post_conditions = table;
        self
    }

    /// Check `result` against `post_condition_id`'s predicate and, if
    /// `tool_name` is claim-bearing, against claim/citation coverage.
    ///
    /// `at_least_review` controls post-condition failure severity (spec.md
    /// §4.6: "failures produce block for review+ tools and warn for safe
    /// tools") and should come from `ToolSpec::risk_tier.at_least_review()`.
    ///
    /// # Errors
    /// Returns [`VerifierError::UnknownPostCondition`] if `post_condition_id`
    /// has no registered predicate — a configuration error, not a normal
    /// verification failure.
    pub async fn check(
        &self,
        tool_name: &str,
        args: &serde_json::Value,
        post_condition_id: &str,
        at_least_review: bool,
        result: &ExecutionResult,
    ) -> Result<Verdict, VerifierError> {
        let post_verdict = self.check_post_condition(args, post_condition_id, at_least_review, result)?;
        let claim_verdict = self.check_claims(tool_name, result).await;
        Ok(post_verdict.and(claim_verdict))
    }

    /// Convenience wrapper over [`Verifier::check`] that takes a
    /// [`neuron_tool::ToolSpec`] directly instead of its `post_condition_id`
    /// and risk tier separately — the shape the Pipeline Orchestrator
    /// actually has in hand after a Wall-approved plan.
    ///
    /// # Errors
    /// See [`Verifier::check`].
    pub async fn check_for_tool(
        &self,
        spec: &neuron_tool::ToolSpec,
        args: &serde_json::Value,
        result: &ExecutionResult,
    ) -> Result<Verdict, VerifierError> {
        self.check(&spec.name, args, &spec.post_condition_id, spec.risk_tier.at_least_review(), result)
            .await
    }

    fn check_post_condition(
        &self,
        args: &serde_json::Value,
        post_condition_id: &str,
        at_least_review: bool,
        result: &ExecutionResult,
    ) -> Result<Verdict, VerifierError> {
        let predicate = self
            .post_conditions
            .get(post_condition_id)
            .ok_or_else(|| VerifierError::UnknownPostCondition(post_condition_id.to_string()))?;
        if predicate(args, result) {
            return Ok(Verdict::pass());
        }
        Ok(if at_least_review {
            Verdict::block(ReasonCode::PostConditionFailed)
        } else {
            Verdict::warn(ReasonCode::PostConditionFailed)
        })
    }

    async fn check_claims(&self, tool_name: &str, result: &ExecutionResult) -> Verdict {
        if !self.config.claim_bearing_tools.contains(tool_name) {
            return Verdict::pass();
        }
        let Some(text) = extract_claim_text(tool_name, result) else {
            return Verdict::pass();
        };
        let claims = split_into_claims(&text);
        if claims.is_empty() {
            return Verdict::pass();
        }
        if result.citations.is_empty() {
            warn!(tool = tool_name, "claims present with no citations to entail against");
            return Verdict::block(ReasonCode::CoverageBelowBlock);
        }

        let mut max_score_per_claim = vec![0.0f32; claims.len()];
        let pairs: Vec<(String, String)> = claims
            .iter()
            .flat_map(|claim| result.citations.iter().map(move |c| (c.source_uri.clone(), claim.text.clone())))
            .collect();

        let mut scores = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(self.config.batch_size.max(1)) {
            match self.entailment.score_batch(chunk).await {
                Ok(batch_scores) => scores.extend(batch_scores),
                Err(e) => {
                    warn!(tool = tool_name, error = %e, "entailment unavailable, degrading to warn");
                    return Verdict::warn(ReasonCode::VerifierDegraded);
                }
            }
        }

        let citations_len = result.citations.len();
        for (i, score) in scores.into_iter().enumerate() {
            let claim_idx = i / citations_len;
            if score > max_score_per_claim[claim_idx] {
                max_score_per_claim[claim_idx] = score;
            }
        }

        let supported = max_score_per_claim
            .iter()
            .filter(|&&s| s >= self.config.entailment_floor)
            .count();
        let coverage = supported as f32 / claims.len() as f32;

        let status = if coverage < self.config.coverage_block_floor {
            Status::Block
        } else if coverage < self.config.coverage_warn_floor {
            Status::Warn
        } else {
            Status::Pass
        };
        let reason = match status {
            Status::Block => ReasonCode::CoverageBelowBlock,
            Status::Warn => ReasonCode::CoverageBelowWarn,
            Status::Pass => ReasonCode::Nominal,
        };
        Verdict { status, reasons: vec![reason], evidence: result.citations.clone() }
    }
}
