//! The fixed list of builtin [`ToolSpec`]s registered at process startup.
//!
//! Per spec.md §9's open question ("the source sometimes treats `calculate`
//! vs `calculator`, `recall_memory` vs `memory` as interchangeable"), exactly
//! one canonical name is fixed per concept here. Callers needing additional
//! tools use [`crate::spec::ToolSpecRegistry::register`] directly.

use crate::spec::{ArgSchema, RiskTier, SideEffect, ToolSpec, ToolSpecError};

/// Register the fixed builtin tool list into `registry`.
///
/// # Errors
/// Propagates [`ToolSpecError::DuplicateTool`] if `registry` already has
/// one of these names registered.
pub fn register_builtin_specs(
    registry: &mut crate::spec::ToolSpecRegistry,
) -> Result<(), ToolSpecError> {
    for spec in builtin_specs()? {
        registry.register(spec)?;
    }
    Ok(())
}

/// Build the fixed builtin tool list without registering it.
pub fn builtin_specs() -> Result<Vec<ToolSpec>, ToolSpecError> {
    Ok(vec![
        ToolSpec::new(
            "get_weather",
            ArgSchema::new(serde_json::json!({
                "type": "object",
                "required": ["location"],
                "properties": {
                    "location": {"type": "string"}
                }
            }))?,
            RiskTier::Safe,
            "weather_payload_shape",
            SideEffect::Network,
        ),
        ToolSpec::new(
            "calculate",
            ArgSchema::new(serde_json::json!({
                "type": "object",
                "required": ["expression"],
                "properties": {
                    "expression": {"type": "string"}
                }
            }))?,
            RiskTier::Safe,
            "numeric_result",
            SideEffect::ReadOnly,
        ),
        ToolSpec::new(
            "recall_memory",
            ArgSchema::new(serde_json::json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {"type": "string"}
                }
            }))?,
            RiskTier::Safe,
            "memory_recall_shape",
            SideEffect::ReadOnly,
        ),
        ToolSpec::new(
            "remember",
            ArgSchema::new(serde_json::json!({
                "type": "object",
                "required": ["text"],
                "properties": {
                    "text": {"type": "string"}
                }
            }))?,
            RiskTier::Safe,
            "memory_write_recorded",
            SideEffect::MemoryWrite,
        ),
        ToolSpec::new(
            "search_web",
            ArgSchema::new(serde_json::json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {"type": "string"}
                }
            }))?,
            RiskTier::Review,
            "http_status_2xx",
            SideEffect::Network,
        ),
        ToolSpec::new(
            "research",
            ArgSchema::new(serde_json::json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {"type": "string"}
                }
            }))?,
            RiskTier::Review,
            "research_answer_shape",
            SideEffect::Network,
        ),
        ToolSpec::new(
            "read_file",
            ArgSchema::new(serde_json::json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {"type": "string"}
                }
            }))?,
            RiskTier::Review,
            "file_readable",
            SideEffect::ReadOnly,
        ),
        ToolSpec::new(
            "delete_file",
            ArgSchema::new(serde_json::json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {"type": "string"}
                }
            }))?,
            RiskTier::Confirm,
            "file_exists_after_write",
            SideEffect::WritesFs,
        ),
        ToolSpec::new(
            "write_file",
            ArgSchema::new(serde_json::json!({
                "type": "object",
                "required": ["path", "content"],
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                }
            }))?,
            RiskTier::Confirm,
            "file_exists_after_write",
            SideEffect::WritesFs,
        ),
        ToolSpec::new(
            "run_shell",
            ArgSchema::new(serde_json::json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": {"type": "string"}
                }
            }))?,
            RiskTier::OwnerRoot,
            "shell_exit_zero",
            SideEffect::OsControl,
        ),
    ])
}
