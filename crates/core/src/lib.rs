//! `courier-core`: primitives shared by every pipeline stage.
//!
//! This crate has **no IO and no async**: identifiers and the domain error model only.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{EventId, ResourceKey};
