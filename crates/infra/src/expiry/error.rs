use thiserror::Error;

use courier_core::DomainError;

/// Indexed store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store throttled: {0}")]
    Throttled(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored item does not have the expected shape.
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Unavailable(_))
    }
}

/// Errors raised by the expiry index and processor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpiryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid expiry timestamp: {0}")]
    InvalidTimestamp(String),

    /// A scheduled-trigger override could not be understood.
    #[error("invalid sweep: {0}")]
    InvalidSweep(String),

    #[error("expiry configuration error: {0}")]
    Configuration(String),
}

impl From<DomainError> for ExpiryError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTimestamp(msg) => Self::InvalidTimestamp(msg),
            other => Self::InvalidSweep(other.to_string()),
        }
    }
}
