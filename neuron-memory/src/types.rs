//! Core data types for the memory service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed cluster taxonomy. Every memory is assigned exactly one of these
/// labels by the online nearest-centroid classifier in [`crate::cluster`].
pub const TAXONOMY: &[&str] = &[
    "time",
    "weather",
    "programming",
    "memory",
    "personal",
    "research",
    "ops",
    "other",
];

/// A single committed memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique id, assigned at commit time.
    pub id: String,
    /// The owning user.
    pub user_id: String,
    /// Natural-language content of the memory.
    pub text: String,
    /// Taxonomy label assigned by online clustering.
    pub cluster_label: String,
    /// Static importance in `[0, 1]`, computed once at commit time.
    pub importance: f32,
    /// When the memory was committed.
    pub created_at: DateTime<Utc>,
    /// Last time this memory was surfaced by `recent`/`search`.
    pub last_accessed_at: DateTime<Utc>,
    /// Dense embedding of `text`, if an [`crate::embedding::EmbeddingModel`]
    /// was available at commit time.
    pub embedding: Option<Vec<f32>>,
    /// The turn this memory was derived from, if any.
    pub source_turn_id: Option<String>,
    /// Name of the tool the originating turn invoked, if any (spec.md §3's
    /// `MemoryRecord.tool_name`).
    pub tool_name: Option<String>,
    /// Whether the originating turn's tool call succeeded.
    pub success: bool,
}

/// Inputs needed to compute a memory's static importance score.
#[derive(Debug, Clone, Copy)]
pub struct ImportanceInputs {
    /// Whether the originating tool call succeeded.
    pub success: bool,
    /// Whether the originating action's risk tier was `review` or above.
    pub high_risk: bool,
    /// Cosine distance (`1 - similarity`) from the nearest existing cluster
    /// centroid; higher means more novel content.
    pub novelty: f32,
}

/// Base weight applied to every memory regardless of its other inputs.
pub const IMPORTANCE_BASE: f32 = 0.2;
/// Weight applied when the originating action succeeded.
pub const IMPORTANCE_SUCCESS_WEIGHT: f32 = 0.3;
/// Weight applied when the originating action was `review` risk or higher.
pub const IMPORTANCE_RISK_WEIGHT: f32 = 0.2;
/// Weight applied to the novelty distance term.
pub const IMPORTANCE_NOVELTY_WEIGHT: f32 = 0.3;

impl ImportanceInputs {
    /// Compute static importance: `base + success*0.3 + risk*0.2 + novelty*0.3`,
    /// clamped to `[0, 1]`.
    pub fn score(&self) -> f32 {
        let mut score = IMPORTANCE_BASE;
        if self.success {
            score += IMPORTANCE_SUCCESS_WEIGHT;
        }
        if self.high_risk {
            score += IMPORTANCE_RISK_WEIGHT;
        }
        score += IMPORTANCE_NOVELTY_WEIGHT * self.novelty.clamp(0.0, 1.0);
        score.clamp(0.0, 1.0)
    }
}

/// Aggregate, per-user view of memory clustering state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserProfile {
    /// The user this profile describes.
    pub user_id: String,
    /// Number of committed memories per taxonomy label (spec.md §3's
    /// "dominant themes (bag of cluster labels with counts)").
    pub label_counts: HashMap<String, usize>,
    /// Total memories committed.
    pub total_memories: usize,
    /// The most recently active taxonomy label, if any.
    pub dominant_label: Option<String>,
    /// Count of committed memories per invoking tool name.
    pub tool_histogram: HashMap<String, usize>,
    /// Fraction of memories whose originating tool call succeeded, in
    /// `[0, 1]`. `None` if the user has no memories yet.
    pub success_rate: Option<f32>,
    /// Timestamp of the user's first committed memory.
    pub first_seen: Option<DateTime<Utc>>,
    /// Timestamp of the user's most recently committed memory.
    pub last_seen: Option<DateTime<Utc>>,
}

/// A cluster's top-1 record among the memories selected for a turn,
/// attached so the caller gets a one-line summary of every theme touched
/// without needing the full set of records from that cluster (spec.md
/// §4.2 step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeExemplar {
    /// Taxonomy label of the cluster this exemplar represents.
    pub cluster_label: String,
    /// Highest-scoring record from that cluster among the selected memories.
    pub exemplar: MemoryRecord,
}

/// The result of `assembleContext`: ranked memories plus degraded-mode flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Memories selected for the turn, ordered by descending relevance.
    pub memories: Vec<MemoryRecord>,
    /// One theme exemplar per distinct cluster among `memories`.
    pub theme_exemplars: Vec<ThemeExemplar>,
    /// The caller's profile, if available.
    pub profile: Option<UserProfile>,
    /// Set when vector search was unavailable and a lexical-only fallback
    /// was used instead.
    pub degraded: bool,
}
