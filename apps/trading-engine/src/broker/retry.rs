//! Retry policy with exponential backoff for broker submissions.
//!
//! Only transient failures ([`BrokerError::is_transient`]) are retried;
//! permanent failures (authentication, invalid order, insufficient funds,
//! market closed, unknown symbol) surface immediately.
//!
//! [`BrokerError::is_transient`]: super::BrokerError::is_transient

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry configuration for order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial try.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth.
    pub backoff_multiplier: f64,
    /// Jitter factor for randomization (0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Backoff state for one submission attempt sequence.
#[derive(Debug)]
pub struct Backoff {
    current_attempt: u32,
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl Backoff {
    /// Create a backoff sequence from a retry policy.
    #[must_use]
    pub const fn new(policy: &RetryPolicy) -> Self {
        Self {
            current_attempt: 0,
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Next backoff duration with jitter, or `None` when attempts are
    /// exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let multiplier = self.backoff_multiplier.powi(self.current_attempt as i32);
        let base_ms = ((self.initial_backoff_ms as f64 * multiplier) as u64).min(self.max_backoff_ms);
        let jittered_ms = self.apply_jitter(base_ms).min(self.max_backoff_ms);

        self.current_attempt += 1;
        Some(Duration::from_millis(jittered_ms))
    }

    /// Attempts consumed so far.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 {
            return backoff_ms;
        }
        let mut rng = rand::rng();
        let jitter_range = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - jitter_range).max(0.0);
        let max = backoff_ms as f64 + jitter_range;
        rng.random_range(min..=max) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_order_retry_contract() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
    }

    #[test]
    fn backoff_sequence_without_jitter() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..Default::default()
        };
        let mut backoff = Backoff::new(&policy);

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(250)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1000)));
        assert!(backoff.next_backoff().is_none());
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 10.0,
            jitter_factor: 0.0,
        };
        let mut backoff = Backoff::new(&policy);

        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy {
            jitter_factor: 0.2,
            ..Default::default()
        };

        for _ in 0..100 {
            let mut backoff = Backoff::new(&policy);
            let duration = backoff.next_backoff().unwrap();
            // Base is 250ms, jitter is ±20%: 200-300ms.
            assert!(
                duration >= Duration::from_millis(200) && duration <= Duration::from_millis(300),
                "duration {duration:?} not in expected range"
            );
        }
    }
}
