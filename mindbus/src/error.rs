//! Bus-level error types.
//!
//! A flat `thiserror` enum with classification helpers, rather than a single
//! opaque error string.

use thiserror::Error;

/// Result type alias for [`crate::bus::MessageBus`] operations.
pub type BusResult<T> = Result<T, BusError>;

#[derive(Error, Debug)]
pub enum BusError {
    /// The payload did not match the schema required by its declared envelope type.
    #[error("payload validation failed: {0}")]
    ValidationFailed(#[from] serde_json::Error),

    /// A `reply_to` queue has not been declared/subscribed before a caller awaits it.
    #[error("no subscriber registered for reply queue '{0}'")]
    NoSuchQueue(String),

    /// The underlying transport (broker connection/channel) failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A `request`-style call exceeded its deadline waiting for a correlated reply.
    #[error("timed out waiting for reply to command {0}")]
    Timeout(uuid::Uuid),

    /// Attempted to publish on a bus handle that has already been closed.
    #[error("bus handle closed")]
    Closed,

    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BusError {
    /// Whether retrying the operation that produced this error might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BusError::Transport(_) | BusError::Timeout(_) | BusError::NoSuchQueue(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(BusError::Transport("connection reset".into()).is_retryable());
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let inner = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert!(!BusError::ValidationFailed(inner).is_retryable());
    }

    #[test]
    fn closed_is_not_retryable() {
        assert!(!BusError::Closed.is_retryable());
    }
}
