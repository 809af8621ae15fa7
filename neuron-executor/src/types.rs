//! Types shared across the Sandbox Executor (spec.md §4.5, §3's
//! `ExecutionResult`/`CitationRef`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// One capability a tool may be granted for a single execution, derived
/// from its [`neuron_tool::SideEffect`] descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read from the filesystem, within the scratch/policy root.
    FsRead,
    /// Write to the filesystem, within the scratch/policy root.
    FsWrite,
    /// Make outbound network requests.
    Network,
    /// Spawn subprocesses / control the OS.
    OsControl,
    /// Write to the memory service.
    MemoryWrite,
}

impl Capability {
    /// The capability set implied by a [`neuron_tool::SideEffect`]
    /// descriptor, used to derive [`ExecutionContext::capabilities`] from
    /// a `ToolSpec` at dispatch time.
    #[must_use]
    pub fn for_side_effect(effect: neuron_tool::SideEffect) -> &'static [Capability] {
        use neuron_tool::SideEffect;
        match effect {
            SideEffect::ReadOnly => &[Capability::FsRead],
            SideEffect::WritesFs => &[Capability::FsRead, Capability::FsWrite],
            SideEffect::Network => &[Capability::Network],
            SideEffect::OsControl => &[Capability::OsControl, Capability::FsRead, Capability::FsWrite],
            SideEffect::MemoryWrite => &[Capability::MemoryWrite],
        }
    }
}

/// Resource caps enforced by the executor around every tool run (spec.md
/// §6's `executor.*` keys).
#[derive(Debug, Clone)]
pub struct ResourceCaps {
    /// Wall-clock deadline for one tool run.
    pub timeout: Duration,
    /// Maximum bytes of textual output kept before truncation.
    pub max_output_bytes: usize,
    /// Maximum bytes a tool may write into its scratch directory.
    pub max_scratch_bytes: u64,
}

impl Default for ResourceCaps {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_output_bytes: 1_048_576,
            max_scratch_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Everything a [`crate::handler::ToolHandler`] receives for one run:
/// capabilities, deadline, cancellation, and an isolated scratch directory
/// (spec.md §4.5).
pub struct ExecutionContext {
    /// Capabilities granted for this run, derived from the tool's
    /// `SideEffect` descriptor.
    pub capabilities: std::collections::HashSet<Capability>,
    /// Cooperative cancellation handle (user barge-in, caller timeout).
    pub cancellation: CancellationToken,
    /// Resource caps for this run.
    pub caps: ResourceCaps,
    /// Root filesystem tools are confined to — mirrors `wall.fs_root` so
    /// the executor's isolation is redundant with, not instead of, the
    /// Wall's policy tier.
    pub fs_root: PathBuf,
    /// Fresh, per-turn scratch directory. Removed when the owning
    /// [`crate::scratch::ScratchDir`] is dropped.
    pub scratch_dir: PathBuf,
}

impl ExecutionContext {
    /// Whether `cap` was granted for this run.
    #[must_use]
    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Validate that an absolute path argument falls under `fs_root`,
    /// independent of (and redundant with) the Wall's own path check.
    #[must_use]
    pub fn path_in_root(&self, path: &std::path::Path) -> bool {
        !path.is_absolute() || path.starts_with(&self.fs_root)
    }
}

/// Why a tool run did not succeed, paralleling spec.md §7's Execution
/// error kinds.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// The tool attempted to use a capability it was not granted.
    CapabilityDenied,
    /// The tool did not complete before its deadline.
    Timeout,
    /// The tool's own logic failed.
    ToolInternalError,
    /// The tool's output exceeded `max_output_bytes` (non-fatal: the
    /// result is still `success`, this flag only explains truncation).
    OutputTooLarge,
}

/// One entry in an [`ExecutionResult`]'s side-effect log: a file touched, a
/// URL fetched, or a process spawned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffectEntry {
    /// A file was created, written, or deleted.
    File {
        /// The path touched.
        path: PathBuf,
        /// What happened to it.
        action: String,
    },
    /// A URL was fetched.
    Url {
        /// The URL fetched.
        url: String,
        /// HTTP status returned, if any.
        status: Option<u16>,
    },
    /// A subprocess was spawned.
    Process {
        /// The command line run.
        command: String,
        /// Its exit code, if it terminated normally.
        exit_code: Option<i32>,
    },
}

/// `{source_uri, byte_span, content_hash}` — spec.md §3's unit of evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRef {
    /// Where the cited content came from.
    pub source_uri: String,
    /// The byte range within that source the citation covers.
    pub byte_span: (usize, usize),
    /// Collision-resistant digest over the cited byte range.
    pub content_hash: String,
}

impl CitationRef {
    /// Build a citation over `bytes`, hashing them with SHA-256 to derive
    /// `content_hash`.
    #[must_use]
    pub fn new(source_uri: impl Into<String>, byte_span: (usize, usize), bytes: &[u8]) -> Self {
        Self {
            source_uri: source_uri.into(),
            byte_span,
            content_hash: content_hash(bytes),
        }
    }
}

/// SHA-256 hex digest of `bytes`, the `content_hash` algorithm used
/// throughout the citation store.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Structured record produced by one tool run (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the tool ran to completion successfully.
    pub success: bool,
    /// Arbitrary structured payload on success.
    pub value: serde_json::Value,
    /// Present when `success` is `false`.
    pub error_kind: Option<ExecutionErrorKind>,
    /// Human-readable error detail, present when `success` is `false`.
    pub error_message: Option<String>,
    /// Files touched, URLs fetched, processes spawned.
    pub side_effect_log: Vec<SideEffectEntry>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Evidence produced by the run, consumed by the claim/citation
    /// verifier.
    pub citations: Vec<CitationRef>,
    /// Set when the run was cancelled before completion rather than
    /// failing on its own.
    pub cancelled: bool,
    /// Set when `timeout` elapsed before the tool completed.
    pub timeout: bool,
    /// Set when textual output was truncated to `max_output_bytes`.
    pub truncated: bool,
}

impl ExecutionResult {
    /// Build a successful result with no side effects or citations.
    #[must_use]
    pub fn ok(value: serde_json::Value, duration: Duration) -> Self {
        Self {
            success: true,
            value,
            error_kind: None,
            error_message: None,
            side_effect_log: Vec::new(),
            duration,
            citations: Vec::new(),
            cancelled: false,
            timeout: false,
            truncated: false,
        }
    }

    /// Build a failed result.
    #[must_use]
    pub fn failed(kind: ExecutionErrorKind, message: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            value: serde_json::Value::Null,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            side_effect_log: Vec::new(),
            duration,
            citations: Vec::new(),
            cancelled: false,
            timeout: kind == ExecutionErrorKind::Timeout,
            truncated: false,
        }
    }

    /// Build a cancelled result: no success, no error kind, `cancelled` set.
    #[must_use]
    pub fn cancelled(duration: Duration) -> Self {
        Self {
            success: false,
            value: serde_json::Value::Null,
            error_kind: None,
            error_message: Some("execution cancelled".into()),
            side_effect_log: Vec::new(),
            duration,
            citations: Vec::new(),
            cancelled: true,
            timeout: false,
            truncated: false,
        }
    }

    /// Attach a value builder method for side effects, for handlers that
    /// build a result incrementally.
    #[must_use]
    pub fn with_side_effect(mut self, entry: SideEffectEntry) -> Self {
        self.side_effect_log.push(entry);
        self
    }

    /// Attach citations produced by the run.
    #[must_use]
    pub fn with_citations(mut self, citations: Vec<CitationRef>) -> Self {
        self.citations = citations;
        self
    }
}
