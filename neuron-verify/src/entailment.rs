//! The [`EntailmentModel`] external-collaborator trait plus a deterministic
//! keyword-overlap fallback (spec.md §4.6: "the entailment capability is an
//! external collaborator; the Verifier must support a deterministic
//! keyword-overlap fallback for tests and offline use").

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from an entailment collaborator.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EntailmentError {
    /// The entailment service is unreachable or errored.
    #[error("entailment unavailable: {0}")]
    Unavailable(String),
}

/// Scores how well a citation entails a claim, batched to amortize model
/// startup (spec.md §4.6's default batch size of 16).
#[async_trait]
pub trait EntailmentModel: Send + Sync {
    /// Score each `(citation_text, claim_text)` pair, in order, returning a
    /// score in `[0, 1]` per pair.
    async fn score_batch(&self, pairs: &[(String, String)]) -> Result<Vec<f32>, EntailmentError>;
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "that", "with", "this", "from", "are", "was", "were", "have", "has",
    "had", "not", "but", "you", "your", "they", "their", "its", "it's", "can", "will", "would",
];

/// Lowercased alphanumeric tokens of length ≥ 3, stop words removed — the
/// same tokenization idiom as a lexical-relevance memory ranker, narrowed
/// here to drive a claim/citation overlap score instead of a recall score.
fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// Deterministic, dependency-free entailment: the fraction of the claim's
/// tokens also present in the citation. Not semantically meaningful, only
/// stable enough to drive coverage-policy tests without a network call.
#[derive(Debug, Default)]
pub struct KeywordOverlapEntailment;

#[async_trait]
impl EntailmentModel for KeywordOverlapEntailment {
    async fn score_batch(&self, pairs: &[(String, String)]) -> Result<Vec<f32>, EntailmentError> {
        Ok(pairs
            .iter()
            .map(|(citation, claim)| {
                let claim_terms = tokenize(claim);
                if claim_terms.is_empty() {
                    return 0.0;
                }
                let citation_terms = tokenize(citation);
                let overlap = claim_terms.intersection(&citation_terms).count() as f32;
                overlap / claim_terms.len() as f32
            })
            .collect())
    }
}
