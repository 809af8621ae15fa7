//! Reply-text selection (spec.md §4.7 step 6, §7 "three shapes of
//! reply"). Internal codes never leak verbatim; they are mapped to short
//! human reasons by the static tables below.

use neuron_executor::ExecutionResult;
use neuron_verify::{ReasonCode, Verdict};

/// Render a successful tool result as the prose a user actually hears,
/// per-tool where the shape is known, falling back to a generic
/// rendering of the value otherwise.
#[must_use]
pub fn tool_success_reply(tool_name: &str, result: &ExecutionResult) -> String {
    let value = &result.value;
    match tool_name {
        "get_weather" => {
            let location = value.get("location").and_then(|v| v.as_str()).unwrap_or("that location");
            let condition = value.get("condition").and_then(|v| v.as_str()).unwrap_or("unknown conditions");
            let temp = value
                .get("temperature_celsius")
                .and_then(|v| v.as_f64())
                .map(|t| format!("{t:.0}\u{b0}C"))
                .unwrap_or_else(|| "an unknown temperature".to_string());
            format!("It's {condition} and {temp} in {location}.")
        }
        "calculate" => {
            let result_str = value.get("result").and_then(|v| v.as_str()).unwrap_or("?");
            format!("The result is {result_str}.")
        }
        "recall_memory" => {
            let memories: Vec<&str> = value
                .get("memories")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|m| m.get("text").and_then(|t| t.as_str())).collect())
                .unwrap_or_default();
            if memories.is_empty() {
                "I don't have anything relevant stored about that.".to_string()
            } else {
                format!("Here's what I remember: {}.", memories.join("; "))
            }
        }
        "remember" => "Got it, I'll remember that.".to_string(),
        "search_web" | "research" => value
            .get("answer")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| {
                value.get("results").and_then(|v| v.as_array()).map(|hits| {
                    hits.iter()
                        .filter_map(|h| h.get("title").and_then(|t| t.as_str()))
                        .collect::<Vec<_>>()
                        .join("; ")
                })
            })
            .unwrap_or_else(|| "I didn't find anything.".to_string()),
        "read_file" => value
            .get("content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| "The file was empty.".to_string()),
        "write_file" => "File saved.".to_string(),
        "delete_file" => "File deleted.".to_string(),
        "run_shell" => value
            .get("stdout")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| "Command completed with no output.".to_string()),
        _ => value.to_string(),
    }
}

/// Prefix a tool reply with a caveat citing the verdict's reasons (spec.md
/// §7: "tool output prefixed by a warning").
#[must_use]
pub fn warn_reply(base: &str, verdict: &Verdict) -> String {
    format!("(Note: {}) {base}", reason_summary(verdict))
}

fn reason_summary(verdict: &Verdict) -> String {
    verdict
        .reasons
        .iter()
        .map(|r| match r {
            ReasonCode::PostConditionFailed => "the result didn't look quite right",
            ReasonCode::CoverageBelowBlock | ReasonCode::CoverageBelowWarn => {
                "I couldn't fully verify every claim"
            }
            ReasonCode::VerifierDegraded => "verification is running in a degraded mode",
            ReasonCode::Nominal => "",
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A refusal reply for a Wall-rejected or failed-execution turn. Maps a
/// short internal `code` to a human reason category; unknown codes fall
/// back to a generic refusal so a new rejection code never leaks raw.
#[must_use]
pub fn refusal_reply(code: &str) -> String {
    let reason = match code {
        "rate_limited" => "you've hit the rate limit for this kind of request",
        "fs_outside_root" | "fs_denied_extension" => "that touches a location I'm not allowed to access",
        "domain_blocked" | "domain_not_allowed" => "that destination isn't on the allowed list",
        "lint_violation" => "that command looks unsafe to run",
        "schema_violation" => "I couldn't understand the request in the shape I needed",
        _ => "it isn't something I'm able to do",
    };
    format!("I can't do that: {reason}.")
}

/// A refusal reply for a verdict that blocked rather than a Wall
/// rejection.
#[must_use]
pub fn blocked_reply(verdict: &Verdict) -> String {
    format!("I can't share that result: {}.", reason_summary(verdict))
}
