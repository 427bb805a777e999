//! Failure model of outbound API clients.

use thiserror::Error;

/// How an outbound API call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The service answered with a non-success status.
    #[error("api returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// No answer within the client's deadline.
    #[error("api call timed out")]
    Timeout,

    #[error("api connection failed: {0}")]
    Connection(String),
}

impl ApiError {
    pub const TOO_MANY_REQUESTS: u16 = 429;

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// HTTP 429. The usual retry predicate for outbound clients.
    pub fn is_rate_limited(&self) -> bool {
        self.status_code() == Some(Self::TOO_MANY_REQUESTS)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
