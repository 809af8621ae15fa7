#![deny(missing_docs)]
//! Long-term memory for neuron agents.
//!
//! Provides the six memory operations used by the pipeline orchestrator:
//! `commit`, `recent`, `search`, `forget`, `profile`, and
//! `assemble_context`. Storage is abstracted behind [`MemoryBackend`] so
//! the scoring/clustering algorithm is independent of where records
//! actually live; `neuron-state-memory` and `neuron-state-fs` provide
//! concrete backends.
//!
//! Memories are assigned one label from a fixed taxonomy
//! ([`types::TAXONOMY`]) by an online nearest-centroid classifier
//! ([`cluster::ClusterState`]), and scored for importance at commit time
//! ([`types::ImportanceInputs`]).

pub mod backend;
pub mod cluster;
pub mod embedding;
pub mod error;
pub mod service;
pub mod types;

pub use backend::MemoryBackend;
pub use cluster::ClusterState;
pub use embedding::{EmbeddingModel, HashEmbedding};
pub use error::{BackendError, MemoryError};
pub use service::{MemoryConfig, MemoryService};
pub use types::{ContextBundle, ImportanceInputs, MemoryRecord, UserProfile, TAXONOMY};
