//! In-memory bus and queue for tests/dev.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::envelope::DomainEvent;
use crate::transport::{
    BatchReport, BusEntry, BusTransport, EntryFailure, QueueEntry, QueueTransport, TransportError,
};

/// How the next `send_batch` call should behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Accept every member.
    Accept,
    /// Reject the members at these positions of the batch, accept the rest.
    RejectPositions(Vec<usize>),
    /// Fail the whole call.
    Fail(TransportError),
}

/// Shared bookkeeping: scripted responses, every call made, every accepted entry.
#[derive(Debug)]
struct Recorder<E> {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<Scripted>,
    calls: Mutex<Vec<(String, Vec<E>)>>,
    accepted: Mutex<Vec<E>>,
}

impl<E: Clone> Recorder<E> {
    fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Scripted::Accept),
            calls: Mutex::new(Vec::new()),
            accepted: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, step: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
    }

    fn set_fallback(&self, step: Scripted) {
        if let Ok(mut fallback) = self.fallback.lock() {
            *fallback = step;
        }
    }

    /// Record the call and decide which positions failed.
    fn handle(&self, endpoint: &str, entries: &[E]) -> Result<Vec<usize>, TransportError> {
        let poisoned = || TransportError::Unavailable("in-memory transport lock poisoned".into());

        self.calls
            .lock()
            .map_err(|_| poisoned())?
            .push((endpoint.to_string(), entries.to_vec()));

        let step = match self.script.lock().map_err(|_| poisoned())?.pop_front() {
            Some(step) => step,
            None => self.fallback.lock().map_err(|_| poisoned())?.clone(),
        };

        let rejected = match step {
            Scripted::Accept => Vec::new(),
            Scripted::RejectPositions(positions) => positions
                .into_iter()
                .filter(|p| *p < entries.len())
                .collect(),
            Scripted::Fail(err) => return Err(err),
        };

        let mut accepted = self.accepted.lock().map_err(|_| poisoned())?;
        for (pos, entry) in entries.iter().enumerate() {
            if !rejected.contains(&pos) {
                accepted.push(entry.clone());
            }
        }
        Ok(rejected)
    }

    fn calls(&self) -> Vec<(String, Vec<E>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn accepted(&self) -> Vec<E> {
        self.accepted.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

/// In-memory event bus.
///
/// - No IO
/// - Accepts everything unless scripted otherwise
/// - Keeps every call for assertions
#[derive(Debug)]
pub struct InMemoryBus {
    inner: Recorder<BusEntry>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a behaviour for the next unscripted call.
    pub fn script(&self, step: Scripted) -> &Self {
        self.inner.push(step);
        self
    }

    /// Behaviour once the script runs out (default: accept).
    pub fn otherwise(&self, step: Scripted) -> &Self {
        self.inner.set_fallback(step);
        self
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls().len()
    }

    /// Batch sizes of every call, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.inner.calls().iter().map(|(_, e)| e.len()).collect()
    }

    pub fn calls(&self) -> Vec<(String, Vec<BusEntry>)> {
        self.inner.calls()
    }

    /// Entries the bus accepted, decoded back into events.
    pub fn delivered_events(&self) -> Vec<DomainEvent> {
        self.inner
            .accepted()
            .iter()
            .filter_map(|e| serde_json::from_str(&e.detail).ok())
            .collect()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self {
            inner: Recorder::new(),
        }
    }
}

#[async_trait]
impl BusTransport for InMemoryBus {
    async fn send_batch(
        &self,
        event_bus: &str,
        entries: &[BusEntry],
    ) -> Result<BatchReport<usize>, TransportError> {
        let rejected = self.inner.handle(event_bus, entries)?;
        Ok(BatchReport::from_failures(
            rejected
                .into_iter()
                .map(|pos| EntryFailure::new(pos).with_error("InternalFailure", "scripted rejection"))
                .collect(),
        ))
    }
}

/// In-memory queue (used as the DLQ in tests).
#[derive(Debug)]
pub struct InMemoryQueue {
    inner: Recorder<QueueEntry>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, step: Scripted) -> &Self {
        self.inner.push(step);
        self
    }

    pub fn otherwise(&self, step: Scripted) -> &Self {
        self.inner.set_fallback(step);
        self
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls().len()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.inner.calls().iter().map(|(_, e)| e.len()).collect()
    }

    /// Messages the queue accepted.
    pub fn messages(&self) -> Vec<QueueEntry> {
        self.inner.accepted()
    }

    /// Accepted message bodies, decoded back into events.
    pub fn received_events(&self) -> Vec<DomainEvent> {
        self.inner
            .accepted()
            .iter()
            .filter_map(|e| serde_json::from_str(&e.body).ok())
            .collect()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self {
            inner: Recorder::new(),
        }
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn send_batch(
        &self,
        queue_url: &str,
        entries: &[QueueEntry],
    ) -> Result<BatchReport<String>, TransportError> {
        let rejected = self.inner.handle(queue_url, entries)?;
        Ok(BatchReport::from_failures(
            rejected
                .into_iter()
                .map(|pos| {
                    EntryFailure::new(entries[pos].id.clone())
                        .with_error("InternalError", "scripted rejection")
                })
                .collect(),
        ))
    }
}
