//! Tier 3 — deny-list lint over code-like arguments.
//!
//! Generalizes `neuron-hook-security::ExfilGuardHook`'s pattern-matching
//! idiom from one fixed concern (exfiltration) to the broader deny-list
//! spec.md §4.4 tier 3 describes: shell chaining/redirection outside the
//! configured root, interpolated subshells, and (for read-only DB tools)
//! SQL statement kinds beyond `SELECT`/`SHOW`.

use regex::Regex;

/// A lint violation: the deny-list pattern that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintViolation(pub String);

/// Arguments that look like shell commands are checked for chaining,
/// redirection, and subshell interpolation.
pub fn lint_shell_like(value: &str) -> Result<(), LintViolation> {
    let chaining = Regex::new(r"&&|\|\||;|\|(?!\|)").expect("valid regex");
    if chaining.is_match(value) {
        return Err(LintViolation("command chaining operator".into()));
    }

    let subshell = Regex::new(r"\$\(|`").expect("valid regex");
    if subshell.is_match(value) {
        return Err(LintViolation("interpolated subshell".into()));
    }

    let redirection = Regex::new(r">\s*/(?!tmp/|scratch/)").expect("valid regex");
    if redirection.is_match(value) {
        return Err(LintViolation("redirection outside scratch root".into()));
    }

    Ok(())
}

/// Arguments that look like SQL are checked against an allow-list of
/// statement kinds for read-only DB tools: only `SELECT`/`SHOW` permitted.
pub fn lint_sql_read_only(value: &str) -> Result<(), LintViolation> {
    let trimmed = value.trim_start();
    let first_word = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_uppercase();
    match first_word.as_str() {
        "SELECT" | "SHOW" | "" => Ok(()),
        other => Err(LintViolation(format!("disallowed SQL statement kind: {other}"))),
    }
}
