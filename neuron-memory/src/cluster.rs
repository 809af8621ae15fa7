//! Online nearest-centroid clustering against a fixed taxonomy.
//!
//! Every memory is assigned the label of the nearest centroid if the
//! cosine similarity clears [`JOIN_THRESHOLD`]; otherwise it falls into
//! `"other"`. Centroids are updated with a running average after each
//! assignment, so the taxonomy drifts to match what a given user actually
//! talks about without ever growing new labels.

use crate::backend::cosine_similarity;
use crate::types::TAXONOMY;
use std::collections::HashMap;

/// Minimum cosine similarity to an existing centroid required to join
/// that cluster instead of falling back to `"other"`.
pub const JOIN_THRESHOLD: f32 = 0.55;

/// Per-user online classifier state.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    centroids: HashMap<String, (Vec<f32>, usize)>,
}

impl ClusterState {
    /// Create an empty classifier; centroids are seeded lazily on first
    /// assignment to each label.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `embedding`, returning the assigned taxonomy label and the
    /// similarity to the centroid it joined (`0.0` for a fresh `"other"`
    /// assignment with no embedding available).
    ///
    /// Updates the winning centroid with a running average. Also returns
    /// the novelty distance (`1 - similarity`) used by the importance
    /// scorer.
    pub fn assign(&mut self, embedding: &[f32]) -> (String, f32) {
        if embedding.is_empty() {
            return ("other".to_string(), 1.0);
        }

        let mut best: Option<(&str, f32)> = None;
        for label in TAXONOMY {
            if let Some((centroid, _)) = self.centroids.get(*label) {
                let sim = cosine_similarity(embedding, centroid);
                if best.is_none_or(|(_, best_sim)| sim > best_sim) {
                    best = Some((label, sim));
                }
            }
        }

        let (label, similarity) = match best {
            Some((label, sim)) if sim >= JOIN_THRESHOLD => (label.to_string(), sim),
            _ => ("other".to_string(), best.map(|(_, s)| s).unwrap_or(0.0)),
        };

        self.update_centroid(&label, embedding);
        let novelty = (1.0 - similarity).clamp(0.0, 1.0);
        (label, novelty)
    }

    fn update_centroid(&mut self, label: &str, embedding: &[f32]) {
        let entry = self
            .centroids
            .entry(label.to_string())
            .or_insert_with(|| (vec![0.0; embedding.len()], 0));
        let (centroid, count) = entry;
        if centroid.len() != embedding.len() {
            *centroid = vec![0.0; embedding.len()];
            *count = 0;
        }
        let n = *count as f32;
        for (c, e) in centroid.iter_mut().zip(embedding.iter()) {
            *c = (*c * n + e) / (n + 1.0);
        }
        *count += 1;
    }
}
