//! Domain events and the reliable path that carries them off a stage.
//!
//! - `DomainEvent`: the immutable envelope every stage emits
//! - `BusTransport` / `QueueTransport`: capability seams for the event bus and the DLQ
//! - `EventValidator`: per-type schema predicates
//! - `ReliablePublisher`: bus delivery with dead-letter fallback; nothing is dropped silently

pub mod envelope;
pub mod in_memory;
pub mod outcome;
pub mod publisher;
pub mod transport;
pub mod validator;

pub use envelope::DomainEvent;
pub use in_memory::{InMemoryBus, InMemoryQueue, Scripted};
pub use outcome::{DeliveryOutcome, DlqReason, PublishReport};
pub use publisher::{MAX_BATCH_SIZE, PublisherConfig, PublisherError, ReliablePublisher};
pub use transport::{
    BatchReport, BusEntry, BusTransport, EntryFailure, QueueEntry, QueueTransport, TransportError,
};
pub use validator::{EnvelopeValidator, EventValidator, ValidationError, ValidatorRegistry};
