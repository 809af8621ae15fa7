//! Token-bucket rate limiting, per `(user_id, risk_tier)` (spec.md §4.4
//! tier 2, §5 "Rate-limit buckets: shared across turns for a single user;
//! protected by a short critical section").

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use neuron_tool::RiskTier;

use crate::types::{RateLimit, RateLimitTable};

/// A single token bucket: refills continuously at `limit / window`,
/// capped at `limit` tokens.
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(limit: RateLimit) -> Self {
        let capacity = f64::from(limit.limit);
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: capacity / limit.window.as_secs_f64(),
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-`(user_id, risk_tier)` token-bucket rate limiter.
pub struct RateLimiter {
    table: RateLimitTable,
    buckets: Mutex<HashMap<(String, RiskTier), Bucket>>,
}

impl RateLimiter {
    /// Construct a limiter from the configured per-tier limits.
    #[must_use]
    pub fn new(table: RateLimitTable) -> Self {
        Self {
            table,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempt to consume one token for `user_id` at `tier`. Returns `true`
    /// if the request may proceed, `false` if it must be rejected with
    /// `rate_limited`.
    pub fn try_acquire(&self, user_id: &str, tier: RiskTier) -> bool {
        let limit = self.table.for_tier(tier);
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry((user_id.to_string(), tier))
            .or_insert_with(|| Bucket::new(limit));
        bucket.try_take()
    }
}
