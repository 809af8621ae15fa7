//! [`Executor`]: registry-based tool dispatch under timeout, output-cap,
//! scratch-isolation, and per-user/global concurrency limits (spec.md §4.5,
//! §5).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ExecutorError;
use crate::handler::ToolHandler;
use crate::scratch::ScratchDir;
use crate::types::{Capability, ExecutionContext, ExecutionErrorKind, ExecutionResult, ResourceCaps};

/// Configuration for the executor's concurrency model (spec.md §6's
/// `executor.*` keys not already covered by [`ResourceCaps`]).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Default resource caps applied when a tool has no override.
    pub default_caps: ResourceCaps,
    /// Root directory scratch dirs and filesystem tools are confined to.
    pub fs_root: PathBuf,
    /// Maximum number of turns executing concurrently across all users.
    pub global_parallelism: usize,
    /// Maximum number of turns executing concurrently per user. spec.md
    /// §5 fixes this at 1 ("two turns for the same user execute
    /// sequentially"); kept configurable for tests.
    pub per_user_parallelism: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_caps: ResourceCaps::default(),
            fs_root: std::env::temp_dir().join("neuron-cortex").join("scratch"),
            global_parallelism: 32,
            per_user_parallelism: 1,
        }
    }
}

/// Registry-based dispatcher running [`ToolHandler`]s under isolation.
///
/// Per-user serialization is `Semaphore`-based rather than a plain mutex so
/// `per_user_parallelism` can be raised above 1 in tests without changing
/// the call shape; the default config matches spec.md §5's "one lock per
/// user" exactly (`per_user_parallelism: 1`).
pub struct Executor {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    config: ExecutorConfig,
    global: Arc<Semaphore>,
    per_user: Mutex<HashMap<String, Arc<Semaphore>>>,
    per_tool_caps: HashMap<String, ResourceCaps>,
}

impl Executor {
    /// Build an executor from a fixed map of tool name to handler.
    #[must_use]
    pub fn new(handlers: HashMap<String, Arc<dyn ToolHandler>>, config: ExecutorConfig) -> Self {
        let global = Arc::new(Semaphore::new(config.global_parallelism.max(1)));
        Self {
            handlers,
            config,
            global,
            per_user: Mutex::new(HashMap::new()),
            per_tool_caps: HashMap::new(),
        }
    }

    /// Override resource caps for a specific tool (e.g. research tools get
    /// up to 120s per spec.md §5's deadline table).
    #[must_use]
    pub fn with_tool_caps(mut self, tool_name: impl Into<String>, caps: ResourceCaps) -> Self {
        self.per_tool_caps.insert(tool_name.into(), caps);
        self
    }

    /// Run `tool_name` with `args` for `user_id` in `turn_id`, enforcing
    /// timeout, output cap, scratch isolation, and per-user/global
    /// concurrency.
    ///
    /// # Errors
    /// Returns [`ExecutorError::NotFound`] if no handler is registered for
    /// `tool_name`, or [`ExecutorError::ScratchSetup`] if the scratch
    /// directory could not be created. A tool that runs but fails (denied
    /// capability, internal error, timeout) is reported via a `success:
    /// false` [`ExecutionResult`], not an `Err`.
    pub async fn execute(
        &self,
        tool_name: &str,
        args: &serde_json::Value,
        side_effect: neuron_tool::SideEffect,
        user_id: &str,
        turn_id: &str,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        let handler = self
            .handlers
            .get(tool_name)
            .cloned()
            .ok_or_else(|| ExecutorError::NotFound(tool_name.to_string()))?;

        let caps = self
            .per_tool_caps
            .get(tool_name)
            .cloned()
            .unwrap_or_else(|| self.config.default_caps.clone());

        let user_permit = self.acquire_user_slot(user_id).await;
        let _global_permit = self.global.acquire().await.expect("semaphore not closed");

        let scratch = ScratchDir::create(&self.config.fs_root, turn_id).await?;
        let capabilities: HashSet<Capability> =
            Capability::for_side_effect(side_effect).iter().copied().collect();

        let ctx = ExecutionContext {
            capabilities,
            cancellation: cancellation.clone(),
            caps: caps.clone(),
            fs_root: self.config.fs_root.clone(),
            scratch_dir: scratch.path().to_path_buf(),
        };

        let start = Instant::now();
        let run = handler.run(args, &ctx);

        let result = tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                info!(tool = tool_name, user_id, "execution cancelled");
                ExecutionResult::cancelled(start.elapsed())
            }
            outcome = tokio::time::timeout(caps.timeout, run) => {
                match outcome {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        warn!(tool = tool_name, user_id, timeout_secs = caps.timeout.as_secs(), "tool timed out");
                        ExecutionResult::failed(
                            ExecutionErrorKind::Timeout,
                            format!("tool '{tool_name}' did not complete within {:?}", caps.timeout),
                            start.elapsed(),
                        )
                    }
                }
            }
        };

        drop(user_permit);
        drop(scratch);

        Ok(cap_output(result, caps.max_output_bytes))
    }

    async fn acquire_user_slot(&self, user_id: &str) -> tokio::sync::OwnedSemaphorePermit {
        let sem = {
            let mut guard = self.per_user.lock().await;
            guard
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_user_parallelism.max(1))))
                .clone()
        };
        sem.acquire_owned().await.expect("semaphore not closed")
    }
}

/// Truncate a successful result's textual `value` if its rendered length
/// exceeds `max_output_bytes`, flagging `truncated` (spec.md §4.5 "Output
/// size cap").
fn cap_output(mut result: ExecutionResult, max_output_bytes: usize) -> ExecutionResult {
    if !result.success {
        return result;
    }
    let rendered = result.value.to_string();
    if rendered.len() <= max_output_bytes {
        return result;
    }
    let mut boundary = max_output_bytes;
    while boundary > 0 && !rendered.is_char_boundary(boundary) {
        boundary -= 1;
    }
    result.value = serde_json::Value::String(format!("{}...[truncated]", &rendered[..boundary]));
    result.truncated = true;
    result
}
