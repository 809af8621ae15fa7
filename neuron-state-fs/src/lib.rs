#![deny(missing_docs)]
//! Filesystem-backed implementation of layer0's StateStore trait.
//!
//! Each scope maps to a subdirectory under the root. Keys are
//! URL-encoded and stored as `.json` files within the scope directory.
//! Provides true persistence across process restarts.

use async_trait::async_trait;
use layer0::effect::Scope;
use layer0::error::StateError;
use layer0::state::{SearchResult, StateStore};
use neuron_memory::{backend::cosine_similarity, BackendError, MemoryBackend, MemoryRecord};
use std::path::{Path, PathBuf};

/// Filesystem-backed state store.
///
/// Directory layout:
/// ```text
/// root/
///   <scope-hash>/
///     <url-encoded-key>.json
/// ```
///
/// Suitable for development, single-machine deployments, and cases
/// where data must survive process restarts without a database.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a new filesystem store rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

/// Derive a safe directory name from a scope.
fn scope_dir_name(scope: &Scope) -> String {
    // Use a deterministic, filesystem-safe representation.
    // We hash the JSON serialization of the scope.
    let json = serde_json::to_string(scope).unwrap_or_else(|_| "unknown".into());
    // Simple hash to avoid overly long directory names
    let mut hash: u64 = 5381;
    for byte in json.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(*byte as u64);
    }
    format!("scope-{hash:016x}")
}

/// Encode a key into a safe filename.
fn key_to_filename(key: &str) -> String {
    let mut encoded = String::new();
    for ch in key.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => encoded.push(ch),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    format!("{encoded}.json")
}

/// Decode a filename back to a key.
fn filename_to_key(filename: &str) -> Option<String> {
    let name = filename.strip_suffix(".json")?;
    let mut result = Vec::new();
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
            let byte = u8::from_str_radix(hex, 16).ok()?;
            result.push(byte);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(result).ok()
}

#[async_trait]
impl StateStore for FsStore {
    async fn read(
        &self,
        scope: &Scope,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StateError> {
        let path = self
            .root
            .join(scope_dir_name(scope))
            .join(key_to_filename(key));
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let value: serde_json::Value = serde_json::from_str(&contents)
                    .map_err(|e| StateError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::WriteFailed(e.to_string())),
        }
    }

    async fn write(
        &self,
        scope: &Scope,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StateError> {
        let dir = self.root.join(scope_dir_name(scope));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StateError::WriteFailed(e.to_string()))?;

        let path = dir.join(key_to_filename(key));
        let contents = serde_json::to_string_pretty(&value)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| StateError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, scope: &Scope, key: &str) -> Result<(), StateError> {
        let path = self
            .root
            .join(scope_dir_name(scope))
            .join(key_to_filename(key));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::WriteFailed(e.to_string())),
        }
    }

    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError> {
        let dir = self.root.join(scope_dir_name(scope));
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StateError::WriteFailed(e.to_string())),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StateError::WriteFailed(e.to_string()))?
        {
            if let Some(filename) = entry.file_name().to_str() {
                if let Some(key) = filename_to_key(filename) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        Ok(keys)
    }

    async fn search(
        &self,
        _scope: &Scope,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<SearchResult>, StateError> {
        // Filesystem store does not support semantic search.
        Ok(vec![])
    }
}

impl FsStore {
    fn user_memories_dir(&self, user_id: &str) -> PathBuf {
        self.root.join("memories").join(key_to_filename(user_id).trim_end_matches(".json"))
    }
}

#[async_trait]
impl MemoryBackend for FsStore {
    async fn put(&self, record: MemoryRecord) -> Result<(), BackendError> {
        let dir = self.user_memories_dir(&record.user_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let path = dir.join(format!("{}.json", record.id));
        let contents = serde_json::to_string_pretty(&record)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_by_id(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<MemoryRecord>, BackendError> {
        let path = self.user_memories_dir(user_id).join(format!("{id}.json"));
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let record: MemoryRecord = serde_json::from_str(&contents)
                    .map_err(|e| BackendError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::Unavailable(e.to_string())),
        }
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, BackendError> {
        let dir = self.user_memories_dir(user_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(BackendError::Unavailable(e.to_string())),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?
        {
            let contents = tokio::fs::read_to_string(entry.path())
                .await
                .map_err(|e| BackendError::Unavailable(e.to_string()))?;
            let record: MemoryRecord = serde_json::from_str(&contents)
                .map_err(|e| BackendError::Serialization(e.to_string()))?;
            records.push(record);
        }
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
        let all = self.list_by_user(user_id, usize::MAX).await?;
        let mut scored: Vec<(MemoryRecord, f32)> = all
            .into_iter()
            .filter_map(|r| {
                let sim = r.embedding.as_ref().map(|e| cosine_similarity(e, query_embedding));
                sim.map(|s| (r, s))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_by_id(&self, user_id: &str, id: &str) -> Result<bool, BackendError> {
        let path = self.user_memories_dir(user_id).join(format!("{id}.json"));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BackendError::Unavailable(e.to_string())),
        }
    }
}
