//! Event validation seam.
//!
//! Schemas are owned by each stage. The publisher only needs a yes/no answer
//! (plus a reason for the logs), so a validator is anything implementing
//! [`EventValidator`], including a plain `Fn(&DomainEvent) -> bool`.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use courier_core::EventId;

use crate::envelope::DomainEvent;

/// Why an event was refused by its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event {event_id} ({event_type}) is invalid: {reason}")]
pub struct ValidationError {
    pub event_id: EventId,
    pub event_type: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(event: &DomainEvent, reason: impl Into<String>) -> Self {
        Self {
            event_id: event.id().clone(),
            event_type: event.event_type().to_string(),
            reason: reason.into(),
        }
    }
}

/// Schema predicate for events.
pub trait EventValidator: Send + Sync {
    fn validate(&self, event: &DomainEvent) -> Result<(), ValidationError>;

    fn is_valid(&self, event: &DomainEvent) -> bool {
        self.validate(event).is_ok()
    }
}

impl<F> EventValidator for F
where
    F: Fn(&DomainEvent) -> bool + Send + Sync,
{
    fn validate(&self, event: &DomainEvent) -> Result<(), ValidationError> {
        if self(event) {
            Ok(())
        } else {
            Err(ValidationError::new(event, "rejected by schema predicate"))
        }
    }
}

/// Shape checks every envelope must pass regardless of its type.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeValidator;

impl EventValidator for EnvelopeValidator {
    fn validate(&self, event: &DomainEvent) -> Result<(), ValidationError> {
        if event.id().as_str().trim().is_empty() {
            return Err(ValidationError::new(event, "id is blank"));
        }
        let event_type = event.event_type();
        if event_type.is_empty() || event_type.chars().any(char::is_whitespace) {
            return Err(ValidationError::new(event, "type must be a non-empty token"));
        }
        if event.source().trim().is_empty() {
            return Err(ValidationError::new(event, "source is blank"));
        }
        Ok(())
    }
}

/// One validator per event type, behind the envelope shape check.
///
/// Events whose type has no registered validator are invalid: an unknown
/// schema cannot be vouched for, so they go to the DLQ for inspection.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    by_type: HashMap<String, Arc<dyn EventValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the validator for `event_type`.
    pub fn register(
        mut self,
        event_type: impl Into<String>,
        validator: impl EventValidator + 'static,
    ) -> Self {
        self.by_type.insert(event_type.into(), Arc::new(validator));
        self
    }

    pub fn knows(&self, event_type: &str) -> bool {
        self.by_type.contains_key(event_type)
    }
}

impl EventValidator for ValidatorRegistry {
    fn validate(&self, event: &DomainEvent) -> Result<(), ValidationError> {
        EnvelopeValidator.validate(event)?;
        match self.by_type.get(event.event_type()) {
            Some(validator) => validator.validate(event),
            None => Err(ValidationError::new(event, "no schema registered for type")),
        }
    }
}

impl core::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut types: Vec<&String> = self.by_type.keys().collect();
        types.sort();
        f.debug_struct("ValidatorRegistry").field("types", &types).finish()
    }
}
