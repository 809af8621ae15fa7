//! Per-turn scratch directory isolation (spec.md §4.5 "Scratch isolation").

use std::path::{Path, PathBuf};

use crate::error::ExecutorError;

/// A fresh directory for one turn's filesystem-touching tool, removed when
/// dropped. Mirrors the "Environment owns or has access to whatever it
/// needs" shape of `layer0::environment::Environment`, narrowed to "a
/// directory" instead of a full isolation boundary.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a fresh scratch directory for `turn_id` under `root`.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ScratchSetup`] if the directory could not
    /// be created.
    pub async fn create(root: &Path, turn_id: &str) -> Result<Self, ExecutorError> {
        let path = root.join(turn_id);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| ExecutorError::ScratchSetup(format!("{:?}: {e}", path)))?;
        Ok(Self { path })
    }

    /// The directory's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let path = self.path.clone();
        // Best-effort cleanup. Spawning a blocking removal avoids making
        // `Drop` async (not possible) while still not blocking the caller's
        // executor thread on directory-tree removal.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn_blocking(move || {
                let _ = std::fs::remove_dir_all(&path);
            });
        } else {
            let _ = std::fs::remove_dir_all(&path);
        }
    }
}
