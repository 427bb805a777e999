//! Transport capabilities consumed by the publisher (mechanics only).
//!
//! The pipeline core never talks to a concrete cloud client. It is handed two
//! capabilities at construction time:
//!
//! - [`BusTransport`]: the shared event bus (fan-out to downstream consumers)
//! - [`QueueTransport`]: a durable queue, used here as the dead-letter queue
//!
//! ## Partial Batch Failure
//!
//! Both transports accept a batch of up to ten entries per call and may reject
//! individual members while accepting the rest. That outcome is a
//! [`BatchReport`], a discriminated result, so callers cannot forget the
//! partial case:
//!
//! ```text
//! Ok(BatchReport::AllSucceeded)          every member accepted
//! Ok(BatchReport::Partial(failures))     listed members rejected, the rest accepted
//! Err(TransportError)                    the call itself failed; assume nothing was accepted
//! ```
//!
//! ## Thread Safety
//!
//! Implementations must be `Send + Sync`; a single client is shared by every
//! component of an invocation (and usually by every invocation in a process).

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

/// One entry of a bus `send_batch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEntry {
    pub source: String,
    pub detail_type: String,
    /// JSON form of the whole event.
    pub detail: String,
}

/// One entry of a queue `send_batch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Batch-local entry id; failures are reported against it.
    pub id: String,
    pub body: String,
    pub attributes: BTreeMap<String, String>,
}

/// A member of a batch the transport refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure<K> {
    /// Which entry failed: an index for the bus, an entry id for queues.
    pub key: K,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl<K> EntryFailure<K> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            code: None,
            message: None,
        }
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self.message = Some(message.into());
        self
    }
}

/// Per-member result of a batch call that reached the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReport<K> {
    AllSucceeded,
    Partial(Vec<EntryFailure<K>>),
}

impl<K> BatchReport<K> {
    /// Build a report from a (possibly empty) failure list.
    pub fn from_failures(failures: Vec<EntryFailure<K>>) -> Self {
        if failures.is_empty() {
            Self::AllSucceeded
        } else {
            Self::Partial(failures)
        }
    }

    pub fn failures(&self) -> &[EntryFailure<K>] {
        match self {
            Self::AllSucceeded => &[],
            Self::Partial(failures) => failures,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.failures().len()
    }
}

/// A transport call that failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Rate limited / too many requests.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Network failure, timeout, or the endpoint is down.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The request itself was refused (malformed, unauthorized, unknown endpoint).
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Unavailable(_))
    }
}

/// Shared event bus.
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Put up to ten entries on `event_bus`. Failures are keyed by entry index.
    async fn send_batch(
        &self,
        event_bus: &str,
        entries: &[BusEntry],
    ) -> Result<BatchReport<usize>, TransportError>;
}

/// Durable queue.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Enqueue up to ten entries on `queue_url`. Failures are keyed by entry id.
    async fn send_batch(
        &self,
        queue_url: &str,
        entries: &[QueueEntry],
    ) -> Result<BatchReport<String>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_failure_list_means_all_succeeded() {
        let report: BatchReport<usize> = BatchReport::from_failures(Vec::new());
        assert_eq!(report, BatchReport::AllSucceeded);
        assert_eq!(report.failed_count(), 0);
    }

    #[test]
    fn partial_report_exposes_failures() {
        let report = BatchReport::from_failures(vec![
            EntryFailure::new(3usize).with_error("ThrottlingException", "slow down"),
        ]);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failures()[0].key, 3);
        assert_eq!(report.failures()[0].code.as_deref(), Some("ThrottlingException"));
    }

    #[test]
    fn only_throttling_and_outages_are_transient() {
        assert!(TransportError::Throttled("429".into()).is_transient());
        assert!(TransportError::Unavailable("timeout".into()).is_transient());
        assert!(!TransportError::Rejected("bad request".into()).is_transient());
    }
}
