//! Validation Wall: five sequential tiers (schema, policy, static
//! analysis, audit decision, risk gating) deciding whether an
//! [`neuron_planner::ActionPlan`] may execute.

pub mod audit;
pub mod error;
pub mod rate_limit;
pub mod static_analysis;
pub mod types;
pub mod wall;

pub use audit::{AuditLog, AuditRecord};
pub use error::WallError;
pub use types::{PolicyConfig, RateLimit, RateLimitTable, Tier, TierOutcome, WallVerdict};
pub use wall::{Wall, WallContext};
