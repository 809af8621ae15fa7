//! Types shared across the Verifier's two sub-verifiers.

use neuron_executor::CitationRef;
use serde::{Deserialize, Serialize};

/// Why a [`Verdict`] landed where it did. Mirrors spec.md §7's
/// verification error kinds plus the degraded-mode reason.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// The post-condition predicate evaluated to false.
    PostConditionFailed,
    /// Claim/citation coverage fell below the policy's block threshold.
    CoverageBelowBlock,
    /// Claim/citation coverage fell below the warn threshold but not block.
    CoverageBelowWarn,
    /// The entailment capability was unavailable; verification degraded
    /// to keyword overlap or could not run at all.
    VerifierDegraded,
    /// Nothing to check (no post-condition id, no textual claims) or
    /// everything checked passed.
    Nominal,
}

/// `{status, reasons, evidence}` — spec.md §3's Verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Overall status.
    pub status: Status,
    /// Why the status landed where it did; may be more than one.
    pub reasons: Vec<ReasonCode>,
    /// Citations that back the claims found supported.
    pub evidence: Vec<CitationRef>,
}

/// The Verdict's tri-state outcome (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The result may surface to the user as-is.
    Pass,
    /// The result may surface with a caveat.
    Warn,
    /// The result must not surface; the orchestrator substitutes a refusal.
    Block,
}

impl Verdict {
    /// A clean pass with no reasons or evidence.
    #[must_use]
    pub fn pass() -> Self {
        Self { status: Status::Pass, reasons: vec![ReasonCode::Nominal], evidence: Vec::new() }
    }

    /// A warn verdict for a single reason.
    #[must_use]
    pub fn warn(reason: ReasonCode) -> Self {
        Self { status: Status::Warn, reasons: vec![reason], evidence: Vec::new() }
    }

    /// A block verdict for a single reason.
    #[must_use]
    pub fn block(reason: ReasonCode) -> Self {
        Self { status: Status::Block, reasons: vec![reason], evidence: Vec::new() }
    }

    /// Attach evidence citations.
    #[must_use]
    pub fn with_evidence(mut self, evidence: Vec<CitationRef>) -> Self {
        self.evidence = evidence;
        self
    }

    /// Combine two verdicts, taking the more severe status (`block` >
    /// `warn` > `pass`) and concatenating reasons/evidence. Used to fold
    /// the post-condition and claim/citation sub-verdicts into one.
    #[must_use]
    pub fn and(mut self, other: Verdict) -> Self {
        self.status = match (self.status, other.status) {
            (Status::Block, _) | (_, Status::Block) => Status::Block,
            (Status::Warn, _) | (_, Status::Warn) => Status::Warn,
            _ => Status::Pass,
        };
        self.reasons.extend(other.reasons);
        self.evidence.extend(other.evidence);
        self
    }
}

/// A textual assertion extracted from a generated reply, to be entailed
/// by some subset of a turn's citations (spec.md §3's Claim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// The claim's own text.
    pub text: String,
}
