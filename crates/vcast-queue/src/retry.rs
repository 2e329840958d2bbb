//! Retry policy for failed attempts.

use std::time::Duration;

/// Total attempt budget and exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Create policy from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self::new(
            std::env::var("QUEUE_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
            std::env::var("QUEUE_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
        )
    }

    /// Delay before the next attempt after `attempts_made` failed attempts.
    pub fn delay_after(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1 << exponent)
    }
}
