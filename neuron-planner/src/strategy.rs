//! [`PlanStrategy`]: the model-backed and rule-based strategies a
//! [`crate::planner::Planner`] composes.

use async_trait::async_trait;
use neuron_memory::ContextBundle;
use neuron_tool::ToolSpecRegistry;
use neuron_turn::provider::Provider;
use neuron_turn::types::{ContentPart, ProviderMessage, ProviderRequest, Role};
use regex::Regex;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::error::StrategyError;
use crate::grammar::{parse_and_validate, render_grammar_prompt};
use crate::types::ActionPlan;

/// A way of turning `(utterance, context, registry)` into an [`ActionPlan`].
///
/// [`crate::planner::Planner`] holds two of these — a primary and a
/// fallback — and transparently falls to the second on failure (spec.md
/// §4.3 Composition).
#[async_trait]
pub trait PlanStrategy: Send + Sync {
    /// Produce a plan, or fail with [`StrategyError`].
    async fn plan(
        &self,
        utterance: &str,
        context: &ContextBundle,
        registry: &ToolSpecRegistry,
    ) -> Result<ActionPlan, StrategyError>;

    /// Human-readable name for logging (which strategy produced / failed
    /// to produce a plan).
    fn name(&self) -> &'static str;
}

/// Render a [`ContextBundle`] into the text block the model strategy
/// includes in its prompt.
fn render_context(context: &ContextBundle) -> String {
    let mut out = String::new();
    if let Some(profile) = &context.profile {
        out.push_str(&format!(
            "User profile: {} memories, dominant theme {:?}\n",
            profile.total_memories, profile.dominant_label
        ));
    }
    if context.degraded {
        out.push_str("(context assembly degraded: semantic search unavailable)\n");
    }
    for record in &context.memories {
        out.push_str(&format!("- [{}] {}\n", record.cluster_label, record.text));
    }
    out
}

/// Invokes a [`Provider`] with a system prompt embedding the grammar
/// constraint, parses the response as an [`ActionPlan`], and retries on
/// parse failure up to `max_retries` times.
///
/// Generalizes `neuron-op-single-shot`'s `SingleShotOperator`: one
/// `Provider::complete` call per attempt, no tool loop, no ReAct.
pub struct ModelBackedStrategy<P: Provider> {
    provider: P,
    system_prompt: String,
    model: Option<String>,
    max_retries: usize,
    deadline: Duration,
}

impl<P: Provider> ModelBackedStrategy<P> {
    /// Construct a model-backed strategy. `max_retries` matches
    /// `planner.max_retries` (spec.md §6, default 2); `deadline` matches
    /// `planner.deadline_ms` (default 10s).
    pub fn new(provider: P, max_retries: usize, deadline: Duration) -> Self {
        Self {
            provider,
            system_prompt:
                "You are the planning stage of a voice assistant. Given the user's utterance \
                 and their assembled memory context, choose exactly one tool to invoke."
                    .to_string(),
            model: None,
            max_retries,
            deadline,
        }
    }

    /// Override the model identifier sent to the provider.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl<P: Provider + 'static> PlanStrategy for ModelBackedStrategy<P> {
    async fn plan(
        &self,
        utterance: &str,
        context: &ContextBundle,
        registry: &ToolSpecRegistry,
    ) -> Result<ActionPlan, StrategyError> {
        let grammar = render_grammar_prompt(registry);
        let system = format!("{}\n\n{}", self.system_prompt, grammar);
        let context_text = render_context(context);

        let mut last_err = String::new();
        for attempt in 0..=self.max_retries {
            let user_text = if attempt == 0 {
                format!("Context:\n{context_text}\nUtterance: {utterance}")
            } else {
                format!(
                    "Context:\n{context_text}\nUtterance: {utterance}\n\n\
                     Your previous response did not parse: {last_err}. \
                     Respond again with ONLY the JSON object."
                )
            };

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: vec![ProviderMessage {
                    role: Role::User,
                    content: vec![ContentPart::Text { text: user_text }],
                }],
                tools: vec![],
                max_tokens: Some(1024),
                temperature: Some(0.0),
                system: Some(system.clone()),
                extra: serde_json::Value::Null,
            };

            let response = match timeout(self.deadline, self.provider.complete(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(StrategyError::Unavailable(e.to_string())),
                Err(_) => return Err(StrategyError::Unavailable("planner deadline exceeded".into())),
            };

            let raw: String = response
                .content
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();

            match parse_and_validate(&raw, registry) {
                Ok(plan) => return Ok(plan),
                Err(e) => {
                    warn!(attempt, error = %e, "model-backed plan failed to parse/validate");
                    last_err = e;
                }
            }
        }

        Err(StrategyError::ParseFailure(last_err))
    }

    fn name(&self) -> &'static str {
        "model-backed"
    }
}

/// A single keyword/regex rule mapping an utterance pattern to a tool and
/// an argument extractor.
struct Rule {
    pattern: Regex,
    tool_name: &'static str,
    extract: fn(&regex::Captures, &str) -> serde_json::Value,
}

/// Deterministic, dependency-free classifier used as the model strategy's
/// fallback, as offline mode, and as ground truth in tests (spec.md
/// §4.3). Grounded on `neuron-hook-security::ExfilGuardHook`'s
/// keyword/regex pattern-matching idiom.
pub struct RuleBasedStrategy {
    rules: Vec<Rule>,
}

impl RuleBasedStrategy {
    /// Build the fixed rule set over the builtin canonical tool names.
    #[must_use]
    pub fn new() -> Self {
        let rules = vec![
            Rule {
                pattern: Regex::new(r"(?i)weather\s+(?:in|for|at)\s+(.+?)[.?!]?$").unwrap(),
                tool_name: "get_weather",
                extract: |caps, _| {
                    serde_json::json!({"location": caps[1].trim()})
                },
            },
            Rule {
                pattern: Regex::new(r"(?i)^(?:calculate|what(?:'s| is))\s+(.+?)[.?!]?$").unwrap(),
                tool_name: "calculate",
                extract: |caps, _| {
                    serde_json::json!({"expression": caps[1].trim()})
                },
            },
            Rule {
                pattern: Regex::new(r"(?i)^(?:my name is|i am|i'm)\s+.+").unwrap(),
                tool_name: "remember",
                extract: |_, utterance| serde_json::json!({"text": utterance.trim()}),
            },
            Rule {
                pattern: Regex::new(r"(?i)remember (?:that|this)?\s*:?\s*(.+)").unwrap(),
                tool_name: "remember",
                extract: |caps, _| serde_json::json!({"text": caps[1].trim()}),
            },
            Rule {
                pattern: Regex::new(r"(?i)what do you remember|recall\s+(.+)").unwrap(),
                tool_name: "recall_memory",
                extract: |caps, utterance| {
                    let query = caps.get(1).map(|m| m.as_str()).unwrap_or(utterance);
                    serde_json::json!({"query": query.trim()})
                },
            },
            Rule {
                pattern: Regex::new(r"(?i)^research\s+(.+)").unwrap(),
                tool_name: "research",
                extract: |caps, _| serde_json::json!({"query": caps[1].trim()}),
            },
            Rule {
                pattern: Regex::new(r"(?i)^search(?: the web)? for\s+(.+)").unwrap(),
                tool_name: "search_web",
                extract: |caps, _| serde_json::json!({"query": caps[1].trim()}),
            },
            Rule {
                pattern: Regex::new(r"(?i)^read\s+(\S+)").unwrap(),
                tool_name: "read_file",
                extract: |caps, _| serde_json::json!({"path": caps[1].trim()}),
            },
            Rule {
                pattern: Regex::new(r"(?i)^delete\s+(\S+)").unwrap(),
                tool_name: "delete_file",
                extract: |caps, _| serde_json::json!({"path": caps[1].trim()}),
            },
        ];
        Self { rules }
    }
}

impl Default for RuleBasedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlanStrategy for RuleBasedStrategy {
    async fn plan(
        &self,
        utterance: &str,
        _context: &ContextBundle,
        registry: &ToolSpecRegistry,
    ) -> Result<ActionPlan, StrategyError> {
        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(utterance) {
                let args = (rule.extract)(&caps, utterance);
                let spec = registry
                    .lookup(rule.tool_name)
                    .ok_or_else(|| StrategyError::Unavailable(format!(
                        "rule-based strategy references unregistered tool '{}'",
                        rule.tool_name
                    )))?;
                spec.arg_schema
                    .validate(&args)
                    .map_err(StrategyError::ParseFailure)?;
                return Ok(ActionPlan::new(rule.tool_name, args));
            }
        }
        Err(StrategyError::NoMatch)
    }

    fn name(&self) -> &'static str {
        "rule-based"
    }
}
