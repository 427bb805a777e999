//! Reliable event publisher: bus first, dead-letter queue as the fallback.
//!
//! This is the **only** path events take off a stage. Its contract:
//!
//! ```text
//! events ─┬─ valid ───► bus (chunks of ≤10) ─┬─ accepted ──────────────► Delivered
//!         │                                  └─ rejected / call failed ─┐
//!         └─ invalid ──────────────────────────────────────────────────┴─► DLQ ─┬─► DeadLettered
//!                                                                              └─► returned to caller
//! ```
//!
//! ## Guarantees
//!
//! - **Total accounting**: every input event ends in exactly one of: on the bus, in the
//!   DLQ, or in the returned list.
//! - **Validation gate**: an invalid event is never offered to the bus.
//! - **No thrown delivery errors**: delivery problems are data (the returned list), so the
//!   calling stage can decide how to signal redelivery upstream.
//! - **No batch atomicity**: chunks succeed or fail member by member; a whole-call
//!   failure fails every member of that chunk only.
//!
//! ## Load
//!
//! Chunks are sent strictly one after another, on the bus and on the DLQ. During a
//! partial outage this keeps one invocation from hammering a shared transport.
//!
//! A bus-rejected event gets exactly one DLQ attempt. A second failure is terminal
//! and the event is handed back to the caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::envelope::DomainEvent;
use crate::outcome::{DeliveryOutcome, DlqReason, PublishReport};
use crate::transport::{BusEntry, BusTransport, QueueEntry, QueueTransport};
use crate::validator::EventValidator;

/// Maximum entries per transport call (bus and queue).
pub const MAX_BATCH_SIZE: usize = 10;

/// Endpoints the publisher writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Event bus identifier (name or ARN).
    pub event_bus: String,
    /// Dead-letter queue identifier (URL).
    pub dlq_url: String,
    /// Replaces every event's own `source` on the bus entry when set.
    pub source_override: Option<String>,
}

impl PublisherConfig {
    pub fn new(event_bus: impl Into<String>, dlq_url: impl Into<String>) -> Self {
        Self {
            event_bus: event_bus.into(),
            dlq_url: dlq_url.into(),
            source_override: None,
        }
    }

    pub fn with_source_override(mut self, source: impl Into<String>) -> Self {
        self.source_override = Some(source.into());
        self
    }
}

/// Raised only for programming-time faults, never for delivery problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublisherError {
    #[error("publisher configuration error: {0}")]
    Configuration(String),
}

/// Moves event batches onto the bus, parking anything it cannot deliver in the DLQ.
pub struct ReliablePublisher {
    config: PublisherConfig,
    bus: Arc<dyn BusTransport>,
    dlq: Arc<dyn QueueTransport>,
}

impl ReliablePublisher {
    /// Create a publisher. Fails if either endpoint identifier is blank.
    pub fn new(
        config: PublisherConfig,
        bus: Arc<dyn BusTransport>,
        dlq: Arc<dyn QueueTransport>,
    ) -> Result<Self, PublisherError> {
        if config.event_bus.trim().is_empty() {
            return Err(PublisherError::Configuration(
                "event bus identifier is required".into(),
            ));
        }
        if config.dlq_url.trim().is_empty() {
            return Err(PublisherError::Configuration("DLQ url is required".into()));
        }
        Ok(Self { config, bus, dlq })
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Publish `events`; returns the ones with no durable placement anywhere.
    pub async fn publish(
        &self,
        events: Vec<DomainEvent>,
        validator: &dyn EventValidator,
    ) -> Vec<DomainEvent> {
        self.publish_with_report(events, validator)
            .await
            .into_undelivered()
    }

    /// Publish `events` and return the full per-event outcome trail.
    pub async fn publish_with_report(
        &self,
        events: Vec<DomainEvent>,
        validator: &dyn EventValidator,
    ) -> PublishReport {
        if events.is_empty() {
            info!("no events to send");
            return PublishReport::default();
        }

        let mut report = PublishReport::new(events);
        let mut valid = Vec::with_capacity(report.len());
        let mut invalid = Vec::new();

        for index in 0..report.len() {
            match validator.validate(report.event(index)) {
                Ok(()) => valid.push(index),
                Err(err) => {
                    warn!(
                        event_id = %err.event_id,
                        event_type = %err.event_type,
                        validation_error = %err.reason,
                        "event validation failed"
                    );
                    report.record(index, DeliveryOutcome::RejectedInvalid);
                    invalid.push(index);
                }
            }
        }

        info!(
            valid_event_count = valid.len(),
            invalid_event_count = invalid.len(),
            total_event_count = report.len(),
            "event validation completed"
        );

        if !invalid.is_empty() {
            self.send_to_dlq(&mut report, &invalid, DlqReason::InvalidEvent)
                .await;
        }

        if !valid.is_empty() {
            let failed = self.send_to_bus(&mut report, &valid).await;
            if !failed.is_empty() {
                self.send_to_dlq(&mut report, &failed, DlqReason::BusFailure)
                    .await;
            }
        }

        report
    }

    /// Returns the report indices the bus did not accept.
    async fn send_to_bus(&self, report: &mut PublishReport, indices: &[usize]) -> Vec<usize> {
        let mut failed = Vec::new();

        info!(
            event_bus = %self.config.event_bus,
            event_count = indices.len(),
            "sending events to bus"
        );

        for chunk in indices.chunks(MAX_BATCH_SIZE) {
            let mut entries = Vec::with_capacity(chunk.len());
            let mut members = Vec::with_capacity(chunk.len());

            for &index in chunk {
                let event = report.event(index);
                match event.to_json() {
                    Ok(detail) => {
                        entries.push(BusEntry {
                            source: self
                                .config
                                .source_override
                                .clone()
                                .unwrap_or_else(|| event.source().to_string()),
                            detail_type: event.event_type().to_string(),
                            detail,
                        });
                        members.push(index);
                    }
                    Err(err) => {
                        warn!(event_id = %event.id(), error = %err, "event could not be serialized for bus");
                        report.record(index, DeliveryOutcome::RejectedTransport);
                        failed.push(index);
                    }
                }
            }

            if entries.is_empty() {
                continue;
            }

            debug!(
                event_bus = %self.config.event_bus,
                batch_size = entries.len(),
                "sending batch to bus"
            );

            match self.bus.send_batch(&self.config.event_bus, &entries).await {
                Ok(batch) => {
                    let mut rejected = vec![false; members.len()];
                    for failure in batch.failures() {
                        match rejected.get_mut(failure.key) {
                            Some(slot) => {
                                *slot = true;
                                warn!(
                                    error_code = ?failure.code,
                                    error_message = ?failure.message,
                                    event_id = %report.event(members[failure.key]).id(),
                                    "event failed to send to bus"
                                );
                            }
                            None => {
                                warn!(index = failure.key, "bus reported a failure for an unknown entry");
                            }
                        }
                    }

                    let failed_entry_count = rejected.iter().filter(|r| **r).count();
                    info!(
                        batch_size = members.len(),
                        failed_entry_count,
                        successful_count = members.len() - failed_entry_count,
                        "bus batch sent"
                    );

                    for (pos, &index) in members.iter().enumerate() {
                        if rejected[pos] {
                            report.record(index, DeliveryOutcome::RejectedTransport);
                            failed.push(index);
                        } else {
                            report.record(index, DeliveryOutcome::Delivered);
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, batch_size = members.len(), "bus send error");
                    for &index in &members {
                        report.record(index, DeliveryOutcome::RejectedTransport);
                        failed.push(index);
                    }
                }
            }
        }

        failed
    }

    /// One DLQ attempt per event; anything refused becomes terminally lost.
    async fn send_to_dlq(&self, report: &mut PublishReport, indices: &[usize], reason: DlqReason) {
        let mut lost = 0usize;

        warn!(
            dlq_url = %self.config.dlq_url,
            event_count = indices.len(),
            reason = %reason,
            "sending failed events to DLQ"
        );

        for chunk in indices.chunks(MAX_BATCH_SIZE) {
            let mut entries = Vec::with_capacity(chunk.len());
            let mut by_entry_id: HashMap<String, usize> = HashMap::with_capacity(chunk.len());

            for &index in chunk {
                let event = report.event(index);
                match event.to_json() {
                    Ok(body) => {
                        let id = Uuid::now_v7().to_string();
                        entries.push(QueueEntry {
                            id: id.clone(),
                            body,
                            attributes: BTreeMap::from([(
                                DlqReason::ATTRIBUTE.to_string(),
                                reason.as_str().to_string(),
                            )]),
                        });
                        by_entry_id.insert(id, index);
                    }
                    Err(err) => {
                        warn!(event_id = %event.id(), error = %err, "event could not be serialized for DLQ");
                        report.record(index, DeliveryOutcome::LostAfterDeadLetterFailure(reason));
                        lost += 1;
                    }
                }
            }

            if entries.is_empty() {
                continue;
            }

            match self.dlq.send_batch(&self.config.dlq_url, &entries).await {
                Ok(batch) => {
                    for failure in batch.failures() {
                        if let Some(index) = by_entry_id.remove(&failure.key) {
                            warn!(
                                error_code = ?failure.code,
                                error_message = ?failure.message,
                                event_id = %report.event(index).id(),
                                "event failed to send to DLQ"
                            );
                            report.record(index, DeliveryOutcome::LostAfterDeadLetterFailure(reason));
                            lost += 1;
                        }
                    }
                    for entry in &entries {
                        if let Some(index) = by_entry_id.remove(&entry.id) {
                            report.record(index, DeliveryOutcome::DeadLettered(reason));
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        dlq_url = %self.config.dlq_url,
                        batch_size = entries.len(),
                        "DLQ send error"
                    );
                    for entry in &entries {
                        if let Some(index) = by_entry_id.remove(&entry.id) {
                            report.record(index, DeliveryOutcome::LostAfterDeadLetterFailure(reason));
                            lost += 1;
                        }
                    }
                }
            }
        }

        if lost > 0 {
            error!(
                failed_event_count = lost,
                dlq_url = %self.config.dlq_url,
                "failed to send events to DLQ"
            );
        }
    }
}

impl core::fmt::Debug for ReliablePublisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReliablePublisher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
