//! In-process token bucket guarding the HTTP endpoints.

use std::time::Duration;

use chrono::{DateTime, Utc};
use onair_config::BucketSpec;
use onair_core::SharedClock;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

/// `tokens = min(capacity, tokens + elapsed * rate)`, then take one.
///
/// Refill and consume happen under one lock so concurrent requests never
/// spend the same token twice.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    clock: SharedClock,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(bucket: BucketSpec, clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            capacity: bucket.capacity,
            refill_per_second: bucket.refill_per_second,
            state: Mutex::new(BucketState {
                tokens: bucket.capacity.max(0.0),
                last_refill: now,
            }),
            clock,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.capacity <= 0.0
    }

    pub fn try_consume(&self) -> bool {
        matches!(self.check(), RateLimitDecision::Allowed)
    }

    pub fn check(&self) -> RateLimitDecision {
        if self.is_disabled() {
            return RateLimitDecision::Allowed;
        }

        let now = self.clock.now();
        let mut state = self.state.lock();

        // A clock that steps backwards must not mint tokens.
        let elapsed = (now - state.last_refill)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
            state.last_refill = now;
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return RateLimitDecision::Allowed;
        }

        let wait = if self.refill_per_second > 0.0 {
            (1.0 - state.tokens) / self.refill_per_second
        } else {
            60.0
        };
        RateLimitDecision::Limited {
            retry_after: Duration::from_secs_f64(wait.clamp(0.0, 3_600.0)),
        }
    }
}
