//! Backoff policy for outbound calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff without jitter.
///
/// The delay before retry `n` (1-indexed) is `initial_interval * exponential_rate^(n-1)`,
/// capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Multiplier applied per attempt
    pub exponential_rate: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Total attempts, including the first one
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            exponential_rate: 2.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with exponential backoff.
    pub fn exponential(
        max_attempts: u32,
        initial_interval: Duration,
        exponential_rate: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            initial_interval,
            exponential_rate,
            max_delay,
            max_attempts,
        }
    }

    /// Create a policy with fixed delays.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            initial_interval: delay,
            exponential_rate: 1.0,
            max_delay: delay,
            max_attempts,
        }
    }

    /// Create a policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base_nanos = self.initial_interval.as_nanos() as f64;
        let max_nanos = self.max_delay.as_nanos() as f64;
        let delay_nanos = base_nanos * self.exponential_rate.powi(exponent);

        if !delay_nanos.is_finite() || delay_nanos >= max_nanos {
            return self.max_delay;
        }
        if delay_nanos <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(delay_nanos.round() as u64)
    }

    /// Check if another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
