//! The grammar constraint: renders the registry's tool specs into a
//! structural contract the model-backed strategy asks the provider to
//! honor, and re-parses + re-validates its output against the same specs.
//!
//! spec.md §4.3: "produced text must be a single well-formed structural
//! object ... `tool_name` must be a registered tool ... `args` must
//! satisfy the tool's argument schema." The concrete representation
//! (EBNF, JSON Schema, finite-state) is an implementation choice
//! (spec.md §9); this renders a JSON Schema per tool plus a system-prompt
//! instruction, since [`neuron_turn::provider::Provider::complete`] has no
//! native grammar parameter to pass a formal grammar to (spec.md §6's
//! `LanguageModel.complete(prompt, grammar?, deadline)` — the `grammar`
//! slot is filled here by prompt-embedding plus parse-and-retry, the
//! fallback path the interface explicitly allows).

use neuron_tool::ToolSpecRegistry;
use std::sync::Arc;

/// Render the registry's tools into a system-prompt section describing
/// the output contract: exactly one JSON object, `tool_name` from the
/// enumerated list, `args` matching that tool's schema.
#[must_use]
pub fn render_grammar_prompt(registry: &ToolSpecRegistry) -> String {
    let mut specs: Vec<Arc<neuron_tool::ToolSpec>> = registry.list(|_| true);
    specs.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    out.push_str(
        "Respond with exactly one JSON object and nothing else — no prose \
         before or after it. The object has exactly two top-level keys: \
         \"tool_name\" (a string naming one of the tools below) and \"args\" \
         (an object matching that tool's schema). Available tools:\n\n",
    );
    for spec in &specs {
        out.push_str(&format!(
            "- \"{}\": args schema {}\n",
            spec.name,
            spec.arg_schema.as_value()
        ));
    }
    out
}

/// Re-parse and re-validate a model's raw text output against the
/// registry's tools, outside of any strategy-specific retry bookkeeping.
///
/// Returns the tool name that was named so the caller can look up risk
/// tier / rate-limit class without a second registry round-trip.
pub fn parse_and_validate(
    raw: &str,
    registry: &ToolSpecRegistry,
) -> Result<crate::types::ActionPlan, String> {
    let trimmed = extract_json_object(raw).ok_or_else(|| "no JSON object found".to_string())?;
    let plan: crate::types::ActionPlan =
        serde_json::from_str(trimmed).map_err(|e| format!("invalid plan JSON: {e}"))?;

    let spec = registry
        .lookup(&plan.tool_name)
        .ok_or_else(|| format!("unknown tool: {}", plan.tool_name))?;

    spec.arg_schema
        .validate(&plan.args)
        .map_err(|e| format!("args failed schema validation: {e}"))?;

    Ok(plan)
}

/// Extract the first top-level `{...}` JSON object from `raw`, tolerating
/// a model that ignores the "no prose" instruction and wraps its answer
/// in a sentence or a markdown code fence.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
