//! Registry-level tool metadata: risk tier, argument schema, rate-limit
//! class, post-condition id, and side-effect descriptor.
//!
//! [`crate::registry::ToolRegistry`] answers "what can I call and how do I
//! call it" for the model (via [`neuron_types::ToolDefinition`]). This
//! module answers a different question — "under what conditions may this
//! tool run, and how do I check that it ran correctly" — for the
//! validation wall, the sandbox executor, and the verifier. The two are
//! kept separate deliberately: a `ToolDefinition` is LLM-facing and can
//! change shape freely; a `ToolSpec` is policy-facing and is registered
//! once, immutably, at startup.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

/// How dangerous a tool's side effects are, and consequently what
/// confirmation/rate-limit policy applies to it.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskTier {
    /// No confirmation, generous rate limit.
    Safe,
    /// Proceeds, but logged with a dry-run preview.
    Review,
    /// Requires an explicit confirmation token from the user.
    Confirm,
    /// Requires a pre-authenticated owner token AND confirmation.
    OwnerRoot,
}

impl RiskTier {
    /// All tiers, ordered from least to most dangerous.
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Safe,
        RiskTier::Review,
        RiskTier::Confirm,
        RiskTier::OwnerRoot,
    ];

    /// Whether this tier is `Review` or higher (used by the memory
    /// service's importance scorer and the verifier's post-condition
    /// severity mapping).
    #[must_use]
    pub fn at_least_review(self) -> bool {
        self >= RiskTier::Review
    }
}

/// What class of side effect a tool has, independent of its risk tier.
/// Drives the capability set the sandbox executor grants it.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SideEffect {
    /// Reads data, touches nothing external.
    ReadOnly,
    /// Writes to the filesystem.
    WritesFs,
    /// Makes network requests.
    Network,
    /// Controls the OS (process spawning, system settings).
    OsControl,
    /// Writes to the memory service.
    MemoryWrite,
}

/// Token-bucket rate-limit class. One bucket per `(user_id, class)`.
/// Mirrors [`RiskTier`] one-to-one in the default policy (spec.md §4.4
/// tier 2) but is its own type because a future policy may decouple them.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitClass {
    /// 50 requests per minute by default.
    Safe,
    /// 20 requests per minute by default.
    Review,
    /// 5 requests per 5 minutes by default.
    Confirm,
    /// 2 requests per hour by default.
    OwnerRoot,
}

impl From<RiskTier> for RateLimitClass {
    fn from(tier: RiskTier) -> Self {
        match tier {
            RiskTier::Safe => RateLimitClass::Safe,
            RiskTier::Review => RateLimitClass::Review,
            RiskTier::Confirm => RateLimitClass::Confirm,
            RiskTier::OwnerRoot => RateLimitClass::OwnerRoot,
        }
    }
}

/// A structural description of a tool's argument shape: a JSON Schema
/// object plus the lightweight validator already used by
/// [`crate::builtin::SchemaValidator`].
#[derive(Debug, Clone)]
pub struct ArgSchema(serde_json::Value);

impl ArgSchema {
    /// Wrap a JSON Schema object. Returns [`ToolSpecError::InvalidSchema`]
    /// if the value is not a JSON object.
    pub fn new(schema: serde_json::Value) -> Result<Self, ToolSpecError> {
        if !schema.is_object() {
            return Err(ToolSpecError::InvalidSchema(
                "schema must be a JSON object".into(),
            ));
        }
        Ok(Self(schema))
    }

    /// The underlying JSON Schema value.
    #[must_use]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Validate `args` against this schema, using the same structural
    /// checks (object/required/type) as [`crate::builtin::SchemaValidator`].
    pub fn validate(&self, args: &serde_json::Value) -> Result<(), String> {
        crate::builtin::validate_input(args, &self.0).map_err(|e| e.to_string())
    }
}

/// Immutable registry entry describing everything outside the wall,
/// executor, and verifier need to know about a tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Canonical tool name. Exactly one name per concept (spec.md §9:
    /// `calculate` not `calculator`, `recall_memory` not `memory`).
    pub name: String,
    /// Structural description of valid arguments.
    pub arg_schema: ArgSchema,
    /// Risk tier, driving rate limits and confirmation policy.
    pub risk_tier: RiskTier,
    /// Rate-limit bucket class.
    pub rate_limit_class: RateLimitClass,
    /// Identifier of the post-condition predicate the verifier evaluates
    /// after execution (e.g. `"weather_payload_shape"`).
    pub post_condition_id: String,
    /// What kind of side effect this tool has.
    pub side_effect: SideEffect,
}

impl ToolSpec {
    /// Construct a new spec. Schema validity is enforced by [`ArgSchema::new`]
    /// at the call site; this constructor assumes a valid schema was built.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        arg_schema: ArgSchema,
        risk_tier: RiskTier,
        post_condition_id: impl Into<String>,
        side_effect: SideEffect,
    ) -> Self {
        let name = name.into();
        Self {
            rate_limit_class: RateLimitClass::from(risk_tier),
            name,
            arg_schema,
            risk_tier,
            post_condition_id: post_condition_id.into(),
            side_effect,
        }
    }
}

/// Errors registering or constructing a [`ToolSpec`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolSpecError {
    /// A spec with this name is already registered.
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
    /// No spec is registered under this name.
    #[error("tool not found: {0}")]
    NotFound(String),
    /// The argument schema is malformed.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Read-only-after-startup catalog of [`ToolSpec`]s.
///
/// Populated once from the builtin list (see `crate::builtin_specs`) plus
/// any specs registered programmatically via [`ToolSpecRegistry::register`]
/// (the admin surface, spec.md §6's `registerTool`). Registration rejects
/// duplicate names rather than silently overwriting, matching
/// [`crate::registry::ToolRegistry`]'s behavior for the same reason.
#[derive(Default)]
pub struct ToolSpecRegistry {
    specs: HashMap<String, Arc<ToolSpec>>,
}

impl ToolSpecRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spec.
    ///
    /// # Errors
    /// Returns [`ToolSpecError::DuplicateTool`] if the name is taken.
    pub fn register(&mut self, spec: ToolSpec) -> Result<(), ToolSpecError> {
        if self.specs.contains_key(&spec.name) {
            return Err(ToolSpecError::DuplicateTool(spec.name));
        }
        self.specs.insert(spec.name.clone(), Arc::new(spec));
        Ok(())
    }

    /// Look up a spec by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<ToolSpec>> {
        self.specs.get(name).cloned()
    }

    /// All specs matching `predicate` (e.g. filter by risk tier or
    /// side-effect class) — the `registry.list(filter)` admin surface.
    #[must_use]
    pub fn list(&self, predicate: impl Fn(&ToolSpec) -> bool) -> Vec<Arc<ToolSpec>> {
        self.specs
            .values()
            .filter(|s| predicate(s))
            .cloned()
            .collect()
    }

    /// Number of registered specs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
