#![deny(missing_docs)]
//! In-memory implementation of layer0's StateStore trait.
//!
//! Uses a `HashMap` behind a `RwLock` for concurrent access.
//! Scopes are serialized to strings for use as key prefixes,
//! providing full scope isolation. Search always returns empty
//! (no semantic search support in the in-memory backend).

use async_trait::async_trait;
use layer0::effect::Scope;
use layer0::error::StateError;
use layer0::state::{SearchResult, StateStore};
use neuron_memory::{backend::cosine_similarity, BackendError, MemoryBackend, MemoryRecord};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory state store backed by a `HashMap` behind a `RwLock`.
///
/// Suitable for testing, prototyping, and single-process use cases
/// where persistence across restarts is not required.
pub struct MemoryStore {
    data: RwLock<HashMap<String, serde_json::Value>>,
    /// Memory records, keyed by user id, used by the [`MemoryBackend`] impl.
    /// Kept separate from `data` because memory records have a distinct
    /// vector-query access pattern from plain key/value state.
    memories: RwLock<HashMap<String, Vec<MemoryRecord>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            memories: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a composite key from scope + key to ensure isolation.
fn composite_key(scope: &Scope, key: &str) -> String {
    let scope_str = serde_json::to_string(scope).unwrap_or_else(|_| "unknown".to_string());
    format!("{scope_str}\0{key}")
}

/// Extract the user-facing key from a composite key, if it belongs to the given scope.
fn extract_key<'a>(composite: &'a str, scope_prefix: &str) -> Option<&'a str> {
    composite
        .strip_prefix(scope_prefix)
        .and_then(|rest| rest.strip_prefix('\0'))
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(
        &self,
        scope: &Scope,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StateError> {
        let ck = composite_key(scope, key);
        let data = self.data.read().await;
        Ok(data.get(&ck).cloned())
    }

    async fn write(
        &self,
        scope: &Scope,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StateError> {
        let ck = composite_key(scope, key);
        let mut data = self.data.write().await;
        data.insert(ck, value);
        Ok(())
    }

    async fn delete(&self, scope: &Scope, key: &str) -> Result<(), StateError> {
        let ck = composite_key(scope, key);
        let mut data = self.data.write().await;
        data.remove(&ck);
        Ok(())
    }

    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError> {
        let scope_prefix =
            serde_json::to_string(scope).unwrap_or_else(|_| "unknown".to_string());
        let data = self.data.read().await;
        let keys: Vec<String> = data
            .keys()
            .filter_map(|ck| {
                extract_key(ck, &scope_prefix).and_then(|k| {
                    if k.starts_with(prefix) {
                        Some(k.to_string())
                    } else {
                        None
                    }
                })
            })
            .collect();
        Ok(keys)
    }

    async fn search(
        &self,
        _scope: &Scope,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<SearchResult>, StateError> {
        // In-memory store does not support semantic search.
        Ok(vec![])
    }
}

#[async_trait]
impl MemoryBackend for MemoryStore {
    async fn put(&self, record: MemoryRecord) -> Result<(), BackendError> {
        let mut memories = self.memories.write().await;
        let bucket = memories.entry(record.user_id.clone()).or_default();
        bucket.retain(|r| r.id != record.id);
        bucket.push(record);
        Ok(())
    }

    async fn get_by_id(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<MemoryRecord>, BackendError> {
        let memories = self.memories.read().await;
        Ok(memories
            .get(user_id)
            .and_then(|bucket| bucket.iter().find(|r| r.id == id))
            .cloned())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, BackendError> {
        let memories = self.memories.read().await;
        let mut records = memories.get(user_id).cloned().unwrap_or_default();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn vector_query(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>, BackendError> {
        let memories = self.memories.read().await;
        let mut scored: Vec<(MemoryRecord, f32)> = memories
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|r| {
                r.embedding
                    .as_ref()
                    .map(|e| (r.clone(), cosine_similarity(e, query_embedding)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_by_id(&self, user_id: &str, id: &str) -> Result<bool, BackendError> {
        let mut memories = self.memories.write().await;
        match memories.get_mut(user_id) {
            Some(bucket) => {
                let before = bucket.len();
                bucket.retain(|r| r.id != id);
                Ok(bucket.len() != before)
            }
            None => Ok(false),
        }
    }
}
