//! The post-condition verifier: a fixed table mapping
//! `ToolSpec.post_condition_id` to a predicate over `(args, ExecutionResult)`
//! (spec.md §4.6).

use std::collections::HashMap;

use neuron_executor::{ExecutionResult, SideEffectEntry};

/// A post-condition check. Takes the plan's original `args` (some checks,
/// like `file_exists_after_write`, need to compare the result against what
/// was asked for) and the `ExecutionResult` it produced.
pub type Predicate = fn(&serde_json::Value, &ExecutionResult) -> bool;

/// The fixed table of builtin post-conditions, keyed by the same ids
/// `neuron_tool::builtin_specs` assigns to the canonical tools.
pub struct PostConditionTable {
    predicates: HashMap<&'static str, Predicate>,
}

impl Default for PostConditionTable {
    fn default() -> Self {
        let mut predicates: HashMap<&'static str, Predicate> = HashMap::new();
        predicates.insert("file_exists_after_write", file_exists_after_write);
        predicates.insert("weather_payload_shape", weather_payload_shape);
        predicates.insert("http_status_2xx", http_status_2xx);
        predicates.insert("numeric_result", numeric_result);
        predicates.insert("memory_recall_shape", memory_recall_shape);
        predicates.insert("memory_write_recorded", memory_write_recorded);
        predicates.insert("research_answer_shape", research_answer_shape);
        predicates.insert("file_readable", file_readable);
        predicates.insert("shell_exit_zero", shell_exit_zero);
        Self { predicates }
    }
}

impl PostConditionTable {
    /// Register or override a predicate, for callers adding custom tools
    /// via `registerTool` (spec.md §6) with their own post-condition id.
    pub fn register(&mut self, id: &'static str, predicate: Predicate) {
        self.predicates.insert(id, predicate);
    }

    /// Look up the predicate for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Predicate> {
        self.predicates.get(id).copied()
    }
}

fn file_exists_after_write(args: &serde_json::Value, result: &ExecutionResult) -> bool {
    if !result.success {
        return false;
    }
    let Some(path_arg) = args.get("path").and_then(|v| v.as_str()) else {
        return false;
    };
    result.side_effect_log.iter().any(|entry| match entry {
        SideEffectEntry::File { path, .. } => path.to_string_lossy().ends_with(path_arg),
        _ => false,
    })
}

fn weather_payload_shape(_args: &serde_json::Value, result: &ExecutionResult) -> bool {
    if !result.success {
        return false;
    }
    let has_location = result.value.get("location").and_then(|v| v.as_str()).is_some();
    let has_condition = result.value.get("condition").and_then(|v| v.as_str()).is_some();
    let has_temperature = result.value.get("temperature_celsius").and_then(|v| v.as_f64()).is_some()
        || result.value.get("temperature").is_some();
    has_location && has_condition && has_temperature
}

fn http_status_2xx(_args: &serde_json::Value, result: &ExecutionResult) -> bool {
    if !result.success {
        return false;
    }
    result.side_effect_log.iter().any(|entry| match entry {
        SideEffectEntry::Url { status: Some(status), .. } => (200..300).contains(status),
        _ => false,
    })
}

fn numeric_result(_args: &serde_json::Value, result: &ExecutionResult) -> bool {
    if !result.success {
        return false;
    }
    result
        .value
        .get("result")
        .and_then(|v| v.as_str())
        .is_some_and(|s| s.parse::<rust_decimal::Decimal>().is_ok())
}

fn memory_recall_shape(_args: &serde_json::Value, result: &ExecutionResult) -> bool {
    result.success && result.value.get("memories").is_some_and(|v| v.is_array())
}

fn memory_write_recorded(_args: &serde_json::Value, result: &ExecutionResult) -> bool {
    result.success && result.value.get("memory_id").and_then(|v| v.as_str()).is_some()
}

fn research_answer_shape(_args: &serde_json::Value, result: &ExecutionResult) -> bool {
    result.success
        && result
            .value
            .get("answer")
            .and_then(|v| v.as_str())
            .is_some_and(|s| !s.is_empty())
}

fn file_readable(_args: &serde_json::Value, result: &ExecutionResult) -> bool {
    result.success && result.value.get("content").and_then(|v| v.as_str()).is_some()
}

fn shell_exit_zero(_args: &serde_json::Value, result: &ExecutionResult) -> bool {
    result.success && result.value.get("exit_code").and_then(|v| v.as_i64()) == Some(0)
}
