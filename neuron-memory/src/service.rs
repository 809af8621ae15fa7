//! [`MemoryService`]: commit/recent/search/forget/profile/assembleContext.

use crate::backend::MemoryBackend;
use crate::cluster::ClusterState;
use crate::embedding::EmbeddingModel;
use crate::error::{BackendError, MemoryError};
use crate::types::{ContextBundle, ImportanceInputs, MemoryRecord, UserProfile};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Tunables for [`MemoryService`].
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Max memories considered for recency-ordered listing.
    pub recent_limit: usize,
    /// Max candidates pulled from `vector_query` before re-ranking.
    pub search_top_k: usize,
    /// Half-life, in hours, used by the recency-decay scoring term.
    pub recency_half_life_hours: f32,
    /// Initial backoff before retrying a buffered write.
    pub wal_initial_backoff: Duration,
    /// Maximum backoff between retries.
    pub wal_max_backoff: Duration,
    /// Minimum similarity a record must match at for `forget(user, query)`
    /// to remove it (spec.md §4.2's "stricter floor (default 0.7)").
    pub forget_floor: f32,
    /// Minimum similarity a record must match at to be returned from
    /// `search` (spec.md §4.2's "similarity in [0,1] ... ≥ configured
    /// floor (default 0.25)").
    pub similarity_floor: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_limit: 20,
            search_top_k: 8,
            recency_half_life_hours: 48.0,
            wal_initial_backoff: Duration::from_millis(250),
            wal_max_backoff: Duration::from_secs(30),
            forget_floor: 0.7,
            similarity_floor: 0.25,
        }
    }
}

/// The memory service: owns a backend, an embedder, and per-user cluster
/// state, and exposes the six operations from the memory component.
pub struct MemoryService<B, E> {
    backend: B,
    embedder: E,
    config: MemoryConfig,
    clusters: Mutex<HashMap<String, ClusterState>>,
    /// Writes that failed with `BackendError::Unavailable`, buffered for
    /// retry. A simplification of a durable write-ahead log: this buffer
    /// lives in process memory and is lost on crash.
    wal: StdMutex<VecDeque<MemoryRecord>>,
}

impl<B: MemoryBackend, E: EmbeddingModel> MemoryService<B, E> {
    /// Construct a service over the given backend and embedder.
    pub fn new(backend: B, embedder: E, config: MemoryConfig) -> Self {
        Self {
            backend,
            embedder,
            config,
            clusters: Mutex::new(HashMap::new()),
            wal: StdMutex::new(VecDeque::new()),
        }
    }

    /// Commit a new memory, scoring its importance and assigning it a
    /// taxonomy label via online nearest-centroid clustering.
    pub async fn commit(
        &self,
        user_id: &str,
        text: &str,
        success: bool,
        high_risk: bool,
        source_turn_id: Option<String>,
        tool_name: Option<String>,
    ) -> Result<MemoryRecord, MemoryError> {
        let embedding = match self.embedder.embed(text).await {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(error = %e, "embedding failed at commit, storing without embedding");
                None
            }
        };

        let (label, novelty) = {
            let mut clusters = self.clusters.lock().await;
            let state = clusters.entry(user_id.to_string()).or_default();
            match &embedding {
                Some(e) => state.assign(e),
                None => ("other".to_string(), 1.0),
            }
        };

        let importance = ImportanceInputs {
            success,
            high_risk,
            novelty,
        }
        .score();

        let now = Utc::now();
        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            cluster_label: label,
            importance,
            created_at: now,
            last_accessed_at: now,
            embedding,
            source_turn_id,
            tool_name,
            success,
        };

        match self.backend.put(record.clone()).await {
            Ok(()) => Ok(record),
            Err(BackendError::Unavailable(reason)) => {
                warn!(%reason, "memory backend unavailable, buffering write");
                self.wal.lock().unwrap().push_back(record.clone());
                Ok(record)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Drain the write-ahead buffer, retrying each entry with exponential
    /// backoff. Intended to be driven by a background task; safe to call
    /// repeatedly (a no-op once the buffer is empty).
    pub async fn drain_wal(&self) {
        loop {
            let record = {
                let mut wal = self.wal.lock().unwrap();
                match wal.pop_front() {
                    Some(r) => r,
                    None => return,
                }
            };

            let mut backoff = self.config.wal_initial_backoff;
            loop {
                match self.backend.put(record.clone()).await {
                    Ok(()) => break,
                    Err(BackendError::Unavailable(_)) => {
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(self.config.wal_max_backoff);
                    }
                    Err(other) => {
                        warn!(error = %other, "dropping buffered memory write after backend error");
                        break;
                    }
                }
            }
        }
    }

    /// The `k` most recently committed memories for a user, newest first
    /// (spec.md §4.2's `recent(user_id, k) -> [MemoryRecord]`).
    pub async fn recent(&self, user_id: &str, k: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self.backend.list_by_user(user_id, k).await?)
    }

    /// Semantic search over a user's memories: at most `top_k` results,
    /// each with similarity at or above the configured floor (spec.md
    /// §4.2). Falls back to a lexical overlap ranking (degraded mode) if
    /// the embedder is unavailable.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<(Vec<(MemoryRecord, f32)>, bool), MemoryError> {
        match self.embedder.embed(query).await {
            Ok(query_embedding) => {
                let fetch = top_k.saturating_add(self.config.search_top_k).max(top_k);
                let mut hits = self.backend.vector_query(user_id, &query_embedding, fetch).await?;
                hits.retain(|(_, similarity)| *similarity >= self.config.similarity_floor);
                hits.truncate(top_k);
                Ok((hits, false))
            }
            Err(e) => {
                warn!(error = %e, "embedder unavailable, falling back to lexical search");
                let all = self.backend.list_by_user(user_id, usize::MAX).await?;
                let mut ranked = lexical_rank(&all, query, top_k.saturating_add(self.config.search_top_k));
                ranked.retain(|(_, score)| *score >= self.config.similarity_floor);
                ranked.truncate(top_k);
                Ok((ranked, true))
            }
        }
    }

    /// Delete a memory by id. Never cascades into any external citation
    /// store — callers that maintain one must delete separately.
    pub async fn forget(&self, user_id: &str, id: &str) -> Result<bool, MemoryError> {
        Ok(self.backend.delete_by_id(user_id, id).await?)
    }

    /// Delete every memory whose content semantically matches `query` at
    /// or above the configured forget floor (default 0.7 — stricter than
    /// `search`'s recall floor, since this is destructive). Returns the
    /// count removed.
    pub async fn forget_matching(&self, user_id: &str, query: &str) -> Result<usize, MemoryError> {
        let (hits, _degraded) = self.search(user_id, query, usize::MAX).await?;
        let mut removed = 0usize;
        for (record, similarity) in hits {
            if similarity >= self.config.forget_floor && self.backend.delete_by_id(user_id, &record.id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Aggregate view of a user's memory distribution across the fixed
    /// taxonomy, tool-use histogram, running success rate, and first/last
    /// activity timestamps (spec.md §3's `UserProfile`).
    pub async fn profile(&self, user_id: &str) -> Result<UserProfile, MemoryError> {
        let records = self.backend.list_by_user(user_id, usize::MAX).await?;
        let mut label_counts: HashMap<String, usize> = HashMap::new();
        let mut tool_histogram: HashMap<String, usize> = HashMap::new();
        let mut successes = 0usize;
        let mut first_seen = None;
        let mut last_seen = None;
        for r in &records {
            *label_counts.entry(r.cluster_label.clone()).or_insert(0) += 1;
            if let Some(tool) = &r.tool_name {
                *tool_histogram.entry(tool.clone()).or_insert(0) += 1;
            }
            if r.success {
                successes += 1;
            }
            first_seen = Some(first_seen.map_or(r.created_at, |f: chrono::DateTime<Utc>| f.min(r.created_at)));
            last_seen = Some(last_seen.map_or(r.created_at, |l: chrono::DateTime<Utc>| l.max(r.created_at)));
        }
        let dominant_label = label_counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(label, _)| label.clone());
        let success_rate = if records.is_empty() { None } else { Some(successes as f32 / records.len() as f32) };
        Ok(UserProfile {
            user_id: user_id.to_string(),
            total_memories: records.len(),
            label_counts,
            dominant_label,
            tool_histogram,
            success_rate,
            first_seen,
            last_seen,
        })
    }

    /// Assemble a ranked, budget-trimmed context bundle combining recent
    /// and semantically relevant memories for a turn, per spec.md §4.2's
    /// five-step context-assembly algorithm:
    /// 1. the `recent_limit` most recent turns
    /// 2. the top semantic hits not already covered by step 1
    /// 3. a theme exemplar (top-1 record) per distinct cluster touched
    /// 4. the user's profile summary
    /// 5. budget-trim: drop lowest-importance semantic hits first, then
    ///    the oldest recent turns, but never the newest 2 recent turns
    ///    or the profile summary.
    pub async fn assemble_context(
        &self,
        user_id: &str,
        query: &str,
        budget: usize,
    ) -> Result<ContextBundle, MemoryError> {
        let recent = self.recent(user_id, self.config.recent_limit).await?;
        let recent_ids: std::collections::HashSet<String> =
            recent.iter().map(|r| r.id.clone()).collect();

        let (search_hits, degraded) = self.search(user_id, query, self.config.search_top_k).await?;
        let mut seen = recent_ids.clone();
        let mut semantic: Vec<(MemoryRecord, f32)> = Vec::new();
        for (record, sim) in search_hits {
            if seen.insert(record.id.clone()) {
                let score = self.combined_score(&record, sim);
                semantic.push((record, score));
            }
        }

        let profile = self.profile(user_id).await.ok();

        // Step 3: top-1 record per distinct cluster among everything selected.
        let mut best_by_label: HashMap<String, (MemoryRecord, f32)> = HashMap::new();
        for record in &recent {
            let score = self.combined_score(record, 0.0);
            best_by_label
                .entry(record.cluster_label.clone())
                .and_modify(|(best_rec, best_score)| {
                    if score > *best_score {
                        *best_rec = record.clone();
                        *best_score = score;
                    }
                })
                .or_insert_with(|| (record.clone(), score));
        }
        for (record, score) in &semantic {
            best_by_label
                .entry(record.cluster_label.clone())
                .and_modify(|(best_rec, best_score)| {
                    if *score > *best_score {
                        *best_rec = record.clone();
                        *best_score = *score;
                    }
                })
                .or_insert_with(|| (record.clone(), *score));
        }
        let mut theme_exemplars: Vec<crate::types::ThemeExemplar> = best_by_label
            .into_iter()
            .map(|(cluster_label, (exemplar, _))| crate::types::ThemeExemplar {
                cluster_label,
                exemplar,
            })
            .collect();
        theme_exemplars.sort_by(|a, b| a.cluster_label.cmp(&b.cluster_label));

        // Step 5: budget-trim. `recent` is already newest-first, so the
        // first two entries are the pinned "newest 2 turns" that are never
        // dropped. Everything else is added in priority order (droppable
        // recent turns, newest-to-oldest, ahead of semantic hits, highest
        // score first) so that when the budget runs out, the tail of this
        // order -- lowest-scoring semantic hits, then oldest recent turns
        // -- is what gets left out.
        let pin = recent.len().min(2);
        let (pinned_recent, droppable_recent) = recent.split_at(pin);

        let mut kept: Vec<MemoryRecord> = Vec::new();
        let mut used = 0usize;
        for record in pinned_recent {
            used += record.text.len();
            kept.push(record.clone());
        }
        for record in droppable_recent {
            let cost = record.text.len();
            if used + cost > budget && !kept.is_empty() {
                continue;
            }
            used += cost;
            kept.push(record.clone());
        }
        semantic.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (record, _score) in semantic {
            let cost = record.text.len();
            if used + cost > budget && !kept.is_empty() {
                continue;
            }
            used += cost;
            kept.push(record);
        }

        Ok(ContextBundle {
            memories: kept,
            theme_exemplars,
            profile,
            degraded,
        })
    }

    fn combined_score(&self, record: &MemoryRecord, similarity: f32) -> f32 {
        let age_hours = (Utc::now() - record.created_at).num_seconds() as f32 / 3600.0;
        let recency = 1.0 / (1.0 + (age_hours.max(0.0) / self.config.recency_half_life_hours));
        record.importance * 0.35 + recency * 0.25 + similarity * 0.4
    }
}

fn lexical_rank(records: &[MemoryRecord], query: &str, top_k: usize) -> Vec<(MemoryRecord, f32)> {
    let query_terms: std::collections::HashSet<String> = tokenize(query);
    let mut scored: Vec<(MemoryRecord, f32)> = records
        .iter()
        .map(|r| {
            let terms = tokenize(&r.text);
            let overlap = query_terms.intersection(&terms).count() as f32;
            let union = query_terms.union(&terms).count().max(1) as f32;
            (r.clone(), overlap / union)
        })
        .filter(|(_, score)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
}

fn tokenize(text: &str) -> std::collections::HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_lowercase())
        .collect()
}
