use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use courier_core::EventId;

/// Envelope for a domain event, as it travels between stages.
///
/// This is the unit the publisher puts on the bus (or parks in the DLQ).
///
/// Notes:
/// - **Immutable**: `id` is assigned once at construction; there are no setters.
/// - `event_type` discriminates the schema the event must satisfy (one schema per type).
/// - `data` is opaque to the pipeline core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    id: EventId,

    #[serde(rename = "type")]
    event_type: String,

    source: String,

    time: DateTime<Utc>,

    #[serde(default)]
    data: JsonValue,
}

impl DomainEvent {
    /// Create a new event with a generated id, stamped with the current time.
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: JsonValue) -> Self {
        Self::from_parts(EventId::new(), event_type, source, Utc::now(), data)
    }

    /// Rebuild an event from known parts (tests, redrive from a DLQ body).
    pub fn from_parts(
        id: EventId,
        event_type: impl Into<String>,
        source: impl Into<String>,
        time: DateTime<Utc>,
        data: JsonValue,
    ) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            source: source.into(),
            time,
            data,
        }
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    pub fn into_data(self) -> JsonValue {
        self.data
    }

    /// Serialize the full envelope to its JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
