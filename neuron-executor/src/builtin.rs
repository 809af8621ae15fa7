//! Concrete [`ToolHandler`] implementations for the canonical builtin tools
//! registered by `neuron_tool::builtin_specs::register_builtin_specs`.
//!
//! External collaborators (weather, web search, research) are injected as
//! traits rather than hardcoded against a specific provider's HTTP API —
//! callers wire in a `reqwest`-backed client pointed at whatever backend
//! they operate, or the deterministic fakes below for tests and offline
//! operation. This mirrors how `neuron-memory` takes an `EmbeddingModel`
//! rather than owning one embedding provider.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::calc;
use crate::handler::ToolHandler;
use crate::types::{
    Capability, CitationRef, ExecutionContext, ExecutionErrorKind, ExecutionResult, SideEffectEntry,
};

fn denied(duration: Duration, cap: Capability) -> ExecutionResult {
    ExecutionResult::failed(
        ExecutionErrorKind::CapabilityDenied,
        format!("capability not granted: {cap:?}"),
        duration,
    )
}

// ---------------------------------------------------------------------
// get_weather
// ---------------------------------------------------------------------

/// A weather reading for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherPayload {
    /// Location the reading covers, normalized by the backend.
    pub location: String,
    /// Temperature in the backend's native unit.
    pub temperature_celsius: f64,
    /// Short human-readable condition (e.g. "cloudy").
    pub condition: String,
}

/// External collaborator for `get_weather`. Implementations own their own
/// endpoint and auth; the executor only knows the trait.
#[async_trait]
pub trait WeatherClient: Send + Sync {
    /// Fetch current conditions for `location`.
    async fn current(&self, location: &str) -> Result<WeatherPayload, String>;
}

/// Deterministic fake for tests and offline operation: derives a stable
/// reading from the location string's length so the same input always
/// yields the same output without a network round trip.
#[derive(Debug, Default)]
pub struct FakeWeatherClient;

#[async_trait]
impl WeatherClient for FakeWeatherClient {
    async fn current(&self, location: &str) -> Result<WeatherPayload, String> {
        let seed = location.bytes().map(u64::from).sum::<u64>();
        Ok(WeatherPayload {
            location: location.to_string(),
            temperature_celsius: 10.0 + (seed % 20) as f64,
            condition: if seed % 2 == 0 { "clear".into() } else { "overcast".into() },
        })
    }
}

/// `reqwest`-backed client for a weather API compatible with the common
/// `?q=<location>` current-conditions shape. `base_url` must be supplied
/// by the caller — there is no compiled-in default endpoint.
pub struct HttpWeatherClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWeatherClient {
    /// Build a client pointed at `base_url` (e.g.
    /// `https://api.example.com/v1/current`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl WeatherClient for HttpWeatherClient {
    async fn current(&self, location: &str) -> Result<WeatherPayload, String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", location)])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("weather backend returned {}", response.status()));
        }
        response
            .json::<WeatherPayload>()
            .await
            .map_err(|e| format!("malformed weather payload: {e}"))
    }
}

/// `ToolHandler` for `get_weather`.
pub struct GetWeatherHandler<C: WeatherClient> {
    client: C,
}

impl<C: WeatherClient> GetWeatherHandler<C> {
    /// Wrap a [`WeatherClient`] as a tool handler.
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: WeatherClient> ToolHandler for GetWeatherHandler<C> {
    async fn run(&self, args: &serde_json::Value, ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        if !ctx.has(Capability::Network) {
            return denied(start.elapsed(), Capability::Network);
        }
        let Some(location) = args.get("location").and_then(|v| v.as_str()) else {
            return ExecutionResult::failed(
                ExecutionErrorKind::ToolInternalError,
                "missing 'location' argument",
                start.elapsed(),
            );
        };
        match self.client.current(location).await {
            Ok(payload) => ExecutionResult::ok(
                serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
                start.elapsed(),
            )
            .with_side_effect(SideEffectEntry::Url { url: location.to_string(), status: Some(200) }),
            Err(message) => {
                ExecutionResult::failed(ExecutionErrorKind::ToolInternalError, message, start.elapsed())
            }
        }
    }
}

// ---------------------------------------------------------------------
// calculate
// ---------------------------------------------------------------------

/// `ToolHandler` for `calculate`: evaluates an arithmetic expression over
/// [`rust_decimal::Decimal`] (see [`crate::calc`]).
#[derive(Debug, Default)]
pub struct CalculateHandler;

#[async_trait]
impl ToolHandler for CalculateHandler {
    async fn run(&self, args: &serde_json::Value, _ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        let Some(expression) = args.get("expression").and_then(|v| v.as_str()) else {
            return ExecutionResult::failed(
                ExecutionErrorKind::ToolInternalError,
                "missing 'expression' argument",
                start.elapsed(),
            );
        };
        match calc::evaluate(expression) {
            Ok(value) => ExecutionResult::ok(serde_json::json!({ "result": value.to_string() }), start.elapsed()),
            Err(e) => ExecutionResult::failed(ExecutionErrorKind::ToolInternalError, e.0, start.elapsed()),
        }
    }
}

// ---------------------------------------------------------------------
// recall_memory / remember
// ---------------------------------------------------------------------

/// One memory recalled for a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalledMemory {
    /// Stored memory text.
    pub text: String,
    /// Relevance score in `[0, 1]`.
    pub score: f32,
}

/// The executor's view of the Memory Service: narrow enough not to pull
/// `neuron-memory` (and its `MemoryBackend`/`EmbeddingModel` generics) into
/// this crate. The orchestrator, which already holds a `MemoryService`,
/// supplies an adapter implementing this trait.
#[async_trait]
pub trait MemoryFacade: Send + Sync {
    /// Recall memories relevant to `query` for `user_id`.
    async fn recall(&self, user_id: &str, query: &str) -> Result<Vec<RecalledMemory>, String>;
    /// Persist `text` as a new memory for `user_id`, returning its id.
    async fn remember(&self, user_id: &str, text: &str) -> Result<String, String>;
}

/// `ToolHandler` for `recall_memory`.
pub struct RecallMemoryHandler<M: MemoryFacade> {
    memory: std::sync::Arc<M>,
    user_id: String,
}

impl<M: MemoryFacade> RecallMemoryHandler<M> {
    /// Build a handler bound to `user_id`'s memory.
    pub fn new(memory: std::sync::Arc<M>, user_id: impl Into<String>) -> Self {
        Self { memory, user_id: user_id.into() }
    }
}

#[async_trait]
impl<M: MemoryFacade> ToolHandler for RecallMemoryHandler<M> {
    async fn run(&self, args: &serde_json::Value, _ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return ExecutionResult::failed(
                ExecutionErrorKind::ToolInternalError,
                "missing 'query' argument",
                start.elapsed(),
            );
        };
        match self.memory.recall(&self.user_id, query).await {
            Ok(hits) => ExecutionResult::ok(
                serde_json::json!({ "memories": hits }),
                start.elapsed(),
            ),
            Err(message) => {
                ExecutionResult::failed(ExecutionErrorKind::ToolInternalError, message, start.elapsed())
            }
        }
    }
}

/// `ToolHandler` for `remember`.
pub struct RememberHandler<M: MemoryFacade> {
    memory: std::sync::Arc<M>,
    user_id: String,
}

impl<M: MemoryFacade> RememberHandler<M> {
    /// Build a handler bound to `user_id`'s memory.
    pub fn new(memory: std::sync::Arc<M>, user_id: impl Into<String>) -> Self {
        Self { memory, user_id: user_id.into() }
    }
}

#[async_trait]
impl<M: MemoryFacade> ToolHandler for RememberHandler<M> {
    async fn run(&self, args: &serde_json::Value, ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        if !ctx.has(Capability::MemoryWrite) {
            return denied(start.elapsed(), Capability::MemoryWrite);
        }
        let Some(text) = args.get("text").and_then(|v| v.as_str()) else {
            return ExecutionResult::failed(
                ExecutionErrorKind::ToolInternalError,
                "missing 'text' argument",
                start.elapsed(),
            );
        };
        match self.memory.remember(&self.user_id, text).await {
            Ok(id) => ExecutionResult::ok(serde_json::json!({ "memory_id": id }), start.elapsed()),
            Err(message) => {
                ExecutionResult::failed(ExecutionErrorKind::ToolInternalError, message, start.elapsed())
            }
        }
    }
}

// ---------------------------------------------------------------------
// search_web
// ---------------------------------------------------------------------

/// One search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub url: String,
    /// Short excerpt.
    pub snippet: String,
}

/// External collaborator for `search_web`.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Run `query` and return ranked hits.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String>;
}

/// Deterministic fake returning a single synthetic hit, for tests.
#[derive(Debug, Default)]
pub struct FakeSearchClient;

#[async_trait]
impl SearchClient for FakeSearchClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String> {
        Ok(vec![SearchHit {
            title: format!("Result for {query}"),
            url: format!("https://example.invalid/search?q={query}"),
            snippet: format!("A synthetic result standing in for '{query}'."),
        }])
    }
}

/// `ToolHandler` for `search_web`.
pub struct SearchWebHandler<C: SearchClient> {
    client: C,
}

impl<C: SearchClient> SearchWebHandler<C> {
    /// Wrap a [`SearchClient`] as a tool handler.
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: SearchClient> ToolHandler for SearchWebHandler<C> {
    async fn run(&self, args: &serde_json::Value, ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        if !ctx.has(Capability::Network) {
            return denied(start.elapsed(), Capability::Network);
        }
        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return ExecutionResult::failed(
                ExecutionErrorKind::ToolInternalError,
                "missing 'query' argument",
                start.elapsed(),
            );
        };
        match self.client.search(query).await {
            Ok(hits) => {
                let mut result = ExecutionResult::ok(
                    serde_json::json!({ "results": hits }),
                    start.elapsed(),
                );
                for hit in &hits {
                    result = result.with_side_effect(SideEffectEntry::Url {
                        url: hit.url.clone(),
                        status: Some(200),
                    });
                }
                result
            }
            Err(message) => {
                ExecutionResult::failed(ExecutionErrorKind::ToolInternalError, message, start.elapsed())
            }
        }
    }
}

// ---------------------------------------------------------------------
// research
// ---------------------------------------------------------------------

/// A cited answer produced by a research backend.
#[derive(Debug, Clone)]
pub struct ResearchAnswer {
    /// The prose answer.
    pub answer_text: String,
    /// Evidence backing `answer_text`, one citation per source consulted.
    pub citations: Vec<(String, Vec<u8>)>,
}

/// External collaborator for `research` — typically a retrieval-augmented
/// pipeline of its own; the executor only needs the final cited answer.
#[async_trait]
pub trait ResearchClient: Send + Sync {
    /// Answer `query`, returning prose plus the byte content of each
    /// source consulted so the executor can hash it into a [`CitationRef`].
    async fn research(&self, query: &str) -> Result<ResearchAnswer, String>;
}

/// Deterministic fake producing a one-sentence answer cited to itself.
#[derive(Debug, Default)]
pub struct FakeResearchClient;

#[async_trait]
impl ResearchClient for FakeResearchClient {
    async fn research(&self, query: &str) -> Result<ResearchAnswer, String> {
        let body = format!("Synthetic finding about '{query}'.").into_bytes();
        Ok(ResearchAnswer {
            answer_text: String::from_utf8_lossy(&body).into_owned(),
            citations: vec![("https://example.invalid/source".to_string(), body)],
        })
    }
}

/// `ToolHandler` for `research`.
pub struct ResearchHandler<C: ResearchClient> {
    client: C,
}

impl<C: ResearchClient> ResearchHandler<C> {
    /// Wrap a [`ResearchClient`] as a tool handler.
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: ResearchClient> ToolHandler for ResearchHandler<C> {
    async fn run(&self, args: &serde_json::Value, ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        if !ctx.has(Capability::Network) {
            return denied(start.elapsed(), Capability::Network);
        }
        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return ExecutionResult::failed(
                ExecutionErrorKind::ToolInternalError,
                "missing 'query' argument",
                start.elapsed(),
            );
        };
        match self.client.research(query).await {
            Ok(answer) => {
                let citations = answer
                    .citations
                    .iter()
                    .map(|(uri, bytes)| CitationRef::new(uri.clone(), (0, bytes.len()), bytes))
                    .collect();
                ExecutionResult::ok(
                    serde_json::json!({ "answer": answer.answer_text }),
                    start.elapsed(),
                )
                .with_citations(citations)
            }
            Err(message) => {
                ExecutionResult::failed(ExecutionErrorKind::ToolInternalError, message, start.elapsed())
            }
        }
    }
}

// ---------------------------------------------------------------------
// read_file / write_file / delete_file
// ---------------------------------------------------------------------

fn resolve_path(ctx: &ExecutionContext, path_arg: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(path_arg);
    let resolved = if candidate.is_absolute() { candidate.to_path_buf() } else { ctx.fs_root.join(candidate) };
    if !ctx.path_in_root(&resolved) {
        return Err(format!("path escapes fs_root: {}", resolved.display()));
    }
    Ok(resolved)
}

/// `ToolHandler` for `read_file`.
#[derive(Debug, Default)]
pub struct ReadFileHandler;

#[async_trait]
impl ToolHandler for ReadFileHandler {
    async fn run(&self, args: &serde_json::Value, ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        if !ctx.has(Capability::FsRead) {
            return denied(start.elapsed(), Capability::FsRead);
        }
        let Some(path_arg) = args.get("path").and_then(|v| v.as_str()) else {
            return ExecutionResult::failed(
                ExecutionErrorKind::ToolInternalError,
                "missing 'path' argument",
                start.elapsed(),
            );
        };
        let path = match resolve_path(ctx, path_arg) {
            Ok(p) => p,
            Err(e) => return ExecutionResult::failed(ExecutionErrorKind::CapabilityDenied, e, start.elapsed()),
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes).into_owned();
                ExecutionResult::ok(serde_json::json!({ "content": content }), start.elapsed())
                    .with_side_effect(SideEffectEntry::File { path, action: "read".into() })
                    .with_citations(vec![CitationRef::new(path_arg, (0, bytes.len()), &bytes)])
            }
            Err(e) => {
                ExecutionResult::failed(ExecutionErrorKind::ToolInternalError, e.to_string(), start.elapsed())
            }
        }
    }
}

/// `ToolHandler` for `write_file`.
#[derive(Debug, Default)]
pub struct WriteFileHandler;

#[async_trait]
impl ToolHandler for WriteFileHandler {
    async fn run(&self, args: &serde_json::Value, ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        if !ctx.has(Capability::FsWrite) {
            return denied(start.elapsed(), Capability::FsWrite);
        }
        let (Some(path_arg), Some(content)) = (
            args.get("path").and_then(|v| v.as_str()),
            args.get("content").and_then(|v| v.as_str()),
        ) else {
            return ExecutionResult::failed(
                ExecutionErrorKind::ToolInternalError,
                "missing 'path' or 'content' argument",
                start.elapsed(),
            );
        };
        let path = match resolve_path(ctx, path_arg) {
            Ok(p) => p,
            Err(e) => return ExecutionResult::failed(ExecutionErrorKind::CapabilityDenied, e, start.elapsed()),
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ExecutionResult::failed(
                    ExecutionErrorKind::ToolInternalError,
                    e.to_string(),
                    start.elapsed(),
                );
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => ExecutionResult::ok(serde_json::json!({ "path": path }), start.elapsed())
                .with_side_effect(SideEffectEntry::File { path, action: "write".into() }),
            Err(e) => {
                ExecutionResult::failed(ExecutionErrorKind::ToolInternalError, e.to_string(), start.elapsed())
            }
        }
    }
}

/// `ToolHandler` for `delete_file`.
#[derive(Debug, Default)]
pub struct DeleteFileHandler;

#[async_trait]
impl ToolHandler for DeleteFileHandler {
    async fn run(&self, args: &serde_json::Value, ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        if !ctx.has(Capability::FsWrite) {
            return denied(start.elapsed(), Capability::FsWrite);
        }
        let Some(path_arg) = args.get("path").and_then(|v| v.as_str()) else {
            return ExecutionResult::failed(
                ExecutionErrorKind::ToolInternalError,
                "missing 'path' argument",
                start.elapsed(),
            );
        };
        let path = match resolve_path(ctx, path_arg) {
            Ok(p) => p,
            Err(e) => return ExecutionResult::failed(ExecutionErrorKind::CapabilityDenied, e, start.elapsed()),
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => ExecutionResult::ok(serde_json::json!({ "path": path }), start.elapsed())
                .with_side_effect(SideEffectEntry::File { path, action: "delete".into() }),
            Err(e) => {
                ExecutionResult::failed(ExecutionErrorKind::ToolInternalError, e.to_string(), start.elapsed())
            }
        }
    }
}

// ---------------------------------------------------------------------
// run_shell
// ---------------------------------------------------------------------

/// `ToolHandler` for `run_shell`: runs `command` via `/bin/sh -c` with
/// `current_dir` pinned to the scratch directory, never the caller's own
/// working directory.
#[derive(Debug, Default)]
pub struct RunShellHandler;

#[async_trait]
impl ToolHandler for RunShellHandler {
    async fn run(&self, args: &serde_json::Value, ctx: &ExecutionContext) -> ExecutionResult {
        let start = Instant::now();
        if !ctx.has(Capability::OsControl) {
            return denied(start.elapsed(), Capability::OsControl);
        }
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return ExecutionResult::failed(
                ExecutionErrorKind::ToolInternalError,
                "missing 'command' argument",
                start.elapsed(),
            );
        };
        let output = tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.scratch_dir)
            .output()
            .await;
        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                ExecutionResult::ok(
                    serde_json::json!({ "stdout": stdout, "stderr": stderr, "exit_code": output.status.code() }),
                    start.elapsed(),
                )
                .with_side_effect(SideEffectEntry::Process {
                    command: command.to_string(),
                    exit_code: output.status.code(),
                })
            }
            Err(e) => {
                ExecutionResult::failed(ExecutionErrorKind::ToolInternalError, e.to_string(), start.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio_util::sync::CancellationToken;

    fn ctx(caps: &[Capability], root: &Path) -> ExecutionContext {
        ExecutionContext {
            capabilities: caps.iter().copied().collect::<HashSet<_>>(),
            cancellation: CancellationToken::new(),
            caps: crate::types::ResourceCaps::default(),
            fs_root: root.to_path_buf(),
            scratch_dir: root.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn calculate_evaluates_expression() {
        let handler = CalculateHandler;
        let tmp = tempfile::tempdir().unwrap();
        let result = handler
            .run(&serde_json::json!({ "expression": "25 * 47 + 183" }), &ctx(&[], tmp.path()))
            .await;
        assert!(result.success);
        assert_eq!(result.value["result"], "1358");
    }

    #[tokio::test]
    async fn get_weather_denied_without_network_capability() {
        let handler = GetWeatherHandler::new(FakeWeatherClient);
        let tmp = tempfile::tempdir().unwrap();
        let result = handler
            .run(&serde_json::json!({ "location": "Boston" }), &ctx(&[], tmp.path()))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ExecutionErrorKind::CapabilityDenied));
    }

    #[tokio::test]
    async fn get_weather_succeeds_with_capability() {
        let handler = GetWeatherHandler::new(FakeWeatherClient);
        let tmp = tempfile::tempdir().unwrap();
        let result = handler
            .run(&serde_json::json!({ "location": "Boston" }), &ctx(&[Capability::Network], tmp.path()))
            .await;
        assert!(result.success);
        assert_eq!(result.side_effect_log.len(), 1);
    }

    #[tokio::test]
    async fn write_then_read_file_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let write = WriteFileHandler;
        let read = ReadFileHandler;
        let write_ctx = ctx(&[Capability::FsRead, Capability::FsWrite], tmp.path());
        let write_result = write
            .run(&serde_json::json!({ "path": "note.txt", "content": "hello" }), &write_ctx)
            .await;
        assert!(write_result.success);
        let read_result = read.run(&serde_json::json!({ "path": "note.txt" }), &write_ctx).await;
        assert!(read_result.success);
        assert_eq!(read_result.value["content"], "hello");
        assert_eq!(read_result.citations.len(), 1);
    }

    #[tokio::test]
    async fn write_file_rejects_path_outside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let write = WriteFileHandler;
        let write_ctx = ctx(&[Capability::FsRead, Capability::FsWrite], tmp.path());
        let result = write
            .run(
                &serde_json::json!({ "path": "/etc/passwd", "content": "pwned" }),
                &write_ctx,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ExecutionErrorKind::CapabilityDenied));
    }

    #[tokio::test]
    async fn delete_file_removes_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let write_ctx = ctx(&[Capability::FsRead, Capability::FsWrite], tmp.path());
        WriteFileHandler
            .run(&serde_json::json!({ "path": "gone.txt", "content": "x" }), &write_ctx)
            .await;
        let result = DeleteFileHandler
            .run(&serde_json::json!({ "path": "gone.txt" }), &write_ctx)
            .await;
        assert!(result.success);
        assert!(!tmp.path().join("gone.txt").exists());
    }

    #[tokio::test]
    async fn run_shell_captures_stdout_and_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = RunShellHandler;
        let result = handler
            .run(
                &serde_json::json!({ "command": "echo hi" }),
                &ctx(&[Capability::OsControl], tmp.path()),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.value["stdout"], "hi\n");
        assert_eq!(result.value["exit_code"], 0);
    }

    struct StubMemory;

    #[async_trait]
    impl MemoryFacade for StubMemory {
        async fn recall(&self, _user_id: &str, query: &str) -> Result<Vec<RecalledMemory>, String> {
            Ok(vec![RecalledMemory { text: format!("about {query}"), score: 0.9 }])
        }

        async fn remember(&self, _user_id: &str, _text: &str) -> Result<String, String> {
            Ok("mem-1".to_string())
        }
    }

    #[tokio::test]
    async fn recall_memory_returns_hits() {
        let handler = RecallMemoryHandler::new(std::sync::Arc::new(StubMemory), "alice");
        let tmp = tempfile::tempdir().unwrap();
        let result = handler
            .run(&serde_json::json!({ "query": "the dog's name" }), &ctx(&[], tmp.path()))
            .await;
        assert!(result.success);
        assert_eq!(result.value["memories"][0]["text"], "about the dog's name");
    }

    #[tokio::test]
    async fn remember_requires_memory_write_capability() {
        let handler = RememberHandler::new(std::sync::Arc::new(StubMemory), "alice");
        let tmp = tempfile::tempdir().unwrap();
        let denied = handler
            .run(&serde_json::json!({ "text": "likes tea" }), &ctx(&[], tmp.path()))
            .await;
        assert!(!denied.success);
        let ok = handler
            .run(
                &serde_json::json!({ "text": "likes tea" }),
                &ctx(&[Capability::MemoryWrite], tmp.path()),
            )
            .await;
        assert!(ok.success);
        assert_eq!(ok.value["memory_id"], "mem-1");
    }

    #[tokio::test]
    async fn research_attaches_citations() {
        let handler = ResearchHandler::new(FakeResearchClient);
        let tmp = tempfile::tempdir().unwrap();
        let result = handler
            .run(&serde_json::json!({ "query": "rust ownership" }), &ctx(&[Capability::Network], tmp.path()))
            .await;
        assert!(result.success);
        assert_eq!(result.citations.len(), 1);
    }
}
