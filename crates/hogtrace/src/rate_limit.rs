//! Per-probe rate limiting (spec.md §5, `max_probe_fires_per_second`).
//!
//! The original implementation never enforced this budget at runtime — it
//! only appears as a field on `HogTraceLimits` — so this is a supplemental
//! module rather than a straight port. A token bucket keyed by
//! `ProbeSpec::full_spec` is the natural fit: spec.md calls for a *rate*,
//! and a bucket gives burst tolerance instead of a hard per-second cliff.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A single probe's token bucket: capacity equals the configured rate, and
/// it refills continuously rather than in discrete per-second ticks.
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_take(&mut self, capacity: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * capacity).min(capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Tracks one bucket per probe spec and answers whether a given fire is
/// within budget. Safe to share across threads; cheap to check on every
/// probe invocation.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `probe_spec` may fire now under `limit_per_sec`,
    /// consuming one token if so. `None` disables rate limiting entirely.
    pub fn check(&self, probe_spec: &str, limit_per_sec: Option<u32>) -> bool {
        let Some(limit) = limit_per_sec else {
            return true;
        };
        let capacity = f64::from(limit);
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        let bucket = buckets
            .entry(probe_spec.to_owned())
            .or_insert_with(|| Bucket::new(capacity, now));
        bucket.try_take(capacity, now)
    }

    /// Drops buckets that haven't been touched recently, so a long-running
    /// process with many transient probe specs doesn't grow this map
    /// unbounded.
    pub fn evict_idle(&self, idle_for: Duration) {
        let now = Instant::now();
        self.buckets
            .lock()
            .expect("rate limiter lock poisoned")
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < idle_for);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_limit_always_allows() {
        let limiter = RateLimiter::new();
        for _ in 0..1000 {
            assert!(limiter.check("a:b:c", None));
        }
    }

    #[test]
    fn exhausts_the_bucket_then_blocks() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("a:b:c", Some(1)));
        assert!(!limiter.check("a:b:c", Some(1)));
    }

    #[test]
    fn buckets_are_independent_per_probe() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("a:b:c", Some(1)));
        assert!(limiter.check("x:y:z", Some(1)));
    }
}
