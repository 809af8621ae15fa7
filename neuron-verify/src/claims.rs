//! Sentence-level claim splitting (spec.md §4.6: "split the textual
//! portion into sentence-level claims").

use crate::types::Claim;

/// Split `text` into sentence-level claims on `.`, `!`, `?` boundaries.
/// Empty or whitespace-only fragments are dropped.
#[must_use]
pub fn split_into_claims(text: &str) -> Vec<Claim> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Claim { text: s.to_string() })
        .collect()
}
