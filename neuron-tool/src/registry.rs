//! The tool registry: named tools plus a composable middleware pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use neuron_types::{Tool, ToolContext, ToolDefinition, ToolDyn, ToolError, ToolOutput};

use crate::middleware::{Next, ToolCall, ToolMiddleware};

/// Registry of tools, with an optional chain of middleware wrapping every
/// call and additional middleware scoped to individual tools.
///
/// Registration rejects duplicate names rather than silently overwriting —
/// two tools racing for the same name is almost always a configuration bug,
/// and overwriting would make the collision invisible.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolDyn>>,
    global_middleware: Vec<Arc<dyn ToolMiddleware>>,
    tool_middleware: HashMap<String, Vec<Arc<dyn ToolMiddleware>>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            global_middleware: Vec::new(),
            tool_middleware: HashMap::new(),
        }
    }

    /// Register a strongly-typed tool.
    ///
    /// # Errors
    /// Returns [`ToolError::DuplicateTool`] if a tool with the same name is
    /// already registered.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<(), ToolError> {
        self.register_dyn(Arc::new(tool))
    }

    /// Register a type-erased tool (an MCP proxy, an HTTP-backed tool, etc).
    ///
    /// # Errors
    /// Returns [`ToolError::DuplicateTool`] if a tool with the same name is
    /// already registered.
    pub fn register_dyn(&mut self, tool: Arc<dyn ToolDyn>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolDyn>> {
        self.tools.get(name)
    }

    /// Tool definitions for every registered tool, for inclusion in a
    /// [`neuron_types::CompletionRequest`].
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Definitions of tools matching `predicate`, for callers that need to
    /// offer a model a restricted subset (e.g. by risk tier or namespace).
    #[must_use]
    pub fn list(&self, predicate: impl Fn(&ToolDefinition) -> bool) -> Vec<ToolDefinition> {
        self.definitions().into_iter().filter(predicate).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Add middleware applied to every tool call, in registration order.
    pub fn add_middleware(&mut self, middleware: impl ToolMiddleware + 'static) -> &mut Self {
        self.global_middleware.push(Arc::new(middleware));
        self
    }

    /// Add middleware scoped to a single tool name, run after the global
    /// chain for calls to that tool only.
    pub fn add_tool_middleware(
        &mut self,
        tool_name: impl Into<String>,
        middleware: impl ToolMiddleware + 'static,
    ) -> &mut Self {
        self.tool_middleware
            .entry(tool_name.into())
            .or_default()
            .push(Arc::new(middleware));
        self
    }

    /// Execute a tool call by name through the registered middleware chain.
    ///
    /// # Errors
    /// Returns [`ToolError::NotFound`] if no tool is registered under `name`,
    /// or whatever error the tool/middleware chain produces.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let mut chain: Vec<Arc<dyn ToolMiddleware>> = self.global_middleware.clone();
        if let Some(scoped) = self.tool_middleware.get(name) {
            chain.extend(scoped.iter().cloned());
        }

        let call = ToolCall {
            id: String::new(),
            name: name.to_string(),
            input,
        };
        Next::new(tool.as_ref(), &chain).run(&call, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
