//! Bounded retry with exponential backoff for outbound calls.
//!
//! ## Design
//!
//! - The caller decides what is retryable (usually "rate limited")
//! - Delays grow exponentially up to a cap, with no jitter
//! - Attempts are sequential; the final error is always surfaced
//!
//! ## Components
//!
//! - `BackoffPolicy`: delay schedule and attempt budget
//! - `RetryExecutor`: runs an async action under a policy
//! - `RetryAttempt`: per-attempt context handed to the action

pub mod backoff;
pub mod executor;

pub use backoff::BackoffPolicy;
pub use executor::{RetryAttempt, RetryExecutor};
