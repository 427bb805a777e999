//! Retry executor for outbound async calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::backoff::BackoffPolicy;

/// Context handed to the action on every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub number: u32,
    /// Total time slept before this attempt
    pub elapsed_delay: Duration,
}

/// Runs an action until it succeeds, fails permanently, or runs out of attempts.
///
/// Attempts are strictly sequential. There is no per-attempt timeout; the action
/// owns that if it needs one.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: BackoffPolicy,
}

impl RetryExecutor {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Run `action`, retrying failures for which `is_retryable` returns true.
    ///
    /// - The first attempt runs immediately.
    /// - A non-retryable failure is returned at once, without sleeping.
    /// - The failure of the last allowed attempt is returned unchanged.
    ///
    /// `max_attempts == 0` is treated as a single attempt.
    pub async fn execute<T, E, F, Fut, P>(&self, mut action: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = RetryAttempt {
            number: 1,
            elapsed_delay: Duration::ZERO,
        };

        loop {
            match action(attempt).await {
                Ok(value) => {
                    if attempt.number > 1 {
                        debug!(
                            attempt = attempt.number,
                            elapsed_delay_ms = attempt.elapsed_delay.as_millis() as u64,
                            "call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !is_retryable(&err) {
                        debug!(attempt = attempt.number, error = %err, "non-retryable failure");
                        return Err(err);
                    }

                    if attempt.number >= max_attempts {
                        error!(
                            attempts = attempt.number,
                            elapsed_delay_ms = attempt.elapsed_delay.as_millis() as u64,
                            error = %err,
                            "retries exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.policy.delay_for(attempt.number);
                    warn!(
                        attempt = attempt.number,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;

                    attempt.number += 1;
                    attempt.elapsed_delay += delay;
                }
            }
        }
    }
}
