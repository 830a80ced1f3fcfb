//! Per-source token buckets for upstream data APIs.
//!
//! Each source gets a bucket refilled continuously at its configured rate.
//! An optional burst capacity seeds the bucket above its steady-state cap,
//! so the first window may exceed the rate; after that the cap applies.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Steady-state limit for one source.
#[derive(Debug, Clone)]
pub struct SourceLimit {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window the rate applies over.
    pub window: Duration,
    /// Optional one-time burst allowance above the steady-state cap.
    pub burst: Option<u32>,
}

impl SourceLimit {
    /// A per-minute limit with no burst.
    #[must_use]
    pub const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
            burst: None,
        }
    }

    /// Allow an initial burst above the steady-state cap.
    #[must_use]
    pub const fn with_burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }
}

#[derive(Debug)]
struct TokenBucket {
    limit: SourceLimit,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(limit: SourceLimit) -> Self {
        let tokens = f64::from(limit.burst.unwrap_or(limit.max_requests));
        Self {
            limit,
            tokens,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.last_refill = now;

        let rate = f64::from(self.limit.max_requests) / self.limit.window.as_secs_f64();
        // Refill converges on the steady-state cap; burst headroom is not
        // replenished.
        let cap = f64::from(self.limit.max_requests);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(cap.max(self.tokens));
    }
}

/// Token-bucket limiter keyed by source name.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Create a limiter with no configured sources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure (or reconfigure) a source. Resets its bucket.
    pub fn configure(&self, source: &str, limit: SourceLimit) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets.insert(source.to_string(), TokenBucket::new(limit));
    }

    /// Take one token for `source`. Unconfigured sources are unlimited.
    pub fn acquire_token(&self, source: &str) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        buckets.get_mut(source).is_none_or(TokenBucket::try_acquire)
    }
}
