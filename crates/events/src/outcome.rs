//! Delivery accounting for one publish call.

use serde::{Deserialize, Serialize};

use crate::envelope::DomainEvent;

/// Why an event was parked in the dead-letter queue.
///
/// Sent with every DLQ message as the `DlqReason` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqReason {
    /// Failed its schema predicate; never offered to the bus.
    InvalidEvent,
    /// Valid, but the bus refused it or the bus call failed.
    BusFailure,
}

impl DlqReason {
    pub const ATTRIBUTE: &'static str = "DlqReason";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidEvent => "INVALID_EVENT",
            Self::BusFailure => "BUS_FAILURE",
        }
    }
}

impl core::fmt::Display for DlqReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step in an event's journey through `ReliablePublisher::publish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Accepted by the bus. Terminal.
    Delivered,
    /// Failed validation; heads to the DLQ.
    RejectedInvalid,
    /// Refused by the bus (member failure or whole-call failure); heads to the DLQ.
    RejectedTransport,
    /// Accepted by the DLQ. Terminal.
    DeadLettered(DlqReason),
    /// The DLQ refused it too. Terminal; the caller owns it now.
    LostAfterDeadLetterFailure(DlqReason),
}

impl DeliveryOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::DeadLettered(_) | Self::LostAfterDeadLetterFailure(_)
        )
    }
}

/// Outcome trail of every input event, in input order.
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    entries: Vec<(DomainEvent, Vec<DeliveryOutcome>)>,
}

impl PublishReport {
    pub(crate) fn new(events: Vec<DomainEvent>) -> Self {
        Self {
            entries: events.into_iter().map(|e| (e, Vec::new())).collect(),
        }
    }

    pub(crate) fn record(&mut self, index: usize, outcome: DeliveryOutcome) {
        if let Some((_, trail)) = self.entries.get_mut(index) {
            trail.push(outcome);
        }
    }

    pub(crate) fn event(&self, index: usize) -> &DomainEvent {
        &self.entries[index].0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every outcome recorded for the event at input position `index`.
    pub fn trail(&self, index: usize) -> &[DeliveryOutcome] {
        self.entries
            .get(index)
            .map(|(_, trail)| trail.as_slice())
            .unwrap_or(&[])
    }

    /// Last recorded outcome for the event at input position `index`.
    pub fn final_outcome(&self, index: usize) -> Option<DeliveryOutcome> {
        self.trail(index).last().copied()
    }

    pub fn delivered_count(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::Delivered))
    }

    pub fn dead_lettered_count(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::DeadLettered(_)))
    }

    pub fn undelivered_count(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::LostAfterDeadLetterFailure(_)))
    }

    /// Events that have no durable placement.
    pub fn undelivered(&self) -> impl Iterator<Item = &DomainEvent> {
        self.entries
            .iter()
            .filter(|(_, trail)| {
                matches!(trail.last(), Some(DeliveryOutcome::LostAfterDeadLetterFailure(_)))
            })
            .map(|(event, _)| event)
    }

    pub fn into_undelivered(self) -> Vec<DomainEvent> {
        self.entries
            .into_iter()
            .filter(|(_, trail)| {
                matches!(trail.last(), Some(DeliveryOutcome::LostAfterDeadLetterFailure(_)))
            })
            .map(|(event, _)| event)
            .collect()
    }

    fn count(&self, pred: impl Fn(&DeliveryOutcome) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|(_, trail)| trail.last().is_some_and(&pred))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dlq_reason_wire_values() {
        assert_eq!(DlqReason::InvalidEvent.as_str(), "INVALID_EVENT");
        assert_eq!(
            serde_json::to_value(DlqReason::BusFailure).unwrap(),
            json!("BUS_FAILURE")
        );
    }

    #[test]
    fn report_counts_by_final_outcome() {
        let events = vec![
            DomainEvent::new("a.v1", "/s", json!({})),
            DomainEvent::new("a.v1", "/s", json!({})),
            DomainEvent::new("a.v1", "/s", json!({})),
        ];
        let mut report = PublishReport::new(events);
        report.record(0, DeliveryOutcome::Delivered);
        report.record(1, DeliveryOutcome::RejectedTransport);
        report.record(1, DeliveryOutcome::DeadLettered(DlqReason::BusFailure));
        report.record(2, DeliveryOutcome::RejectedInvalid);
        report.record(2, DeliveryOutcome::LostAfterDeadLetterFailure(DlqReason::InvalidEvent));

        assert_eq!(report.delivered_count(), 1);
        assert_eq!(report.dead_lettered_count(), 1);
        assert_eq!(report.undelivered_count(), 1);
        assert_eq!(report.trail(1).len(), 2);
        assert!(report.final_outcome(2).unwrap().is_terminal());
        assert!(!DeliveryOutcome::RejectedInvalid.is_terminal());
        assert_eq!(report.into_undelivered().len(), 1);
    }
}
