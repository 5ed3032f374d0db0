//! The fixed error-code taxonomy shared by every `error` envelope on the bus.
//!
//! Modelled on a standard RPC status set rather than invented ad hoc, so that
//! agents written against this bus can share a retry policy without knowing
//! each other's internal exception types.

use serde::{Deserialize, Serialize};

/// A bus-level error code.
///
/// Each variant carries a default retryability via [`ErrorCode::default_retryable`],
/// but a sender may still override `retryable` explicitly on the envelope if it has
/// more specific knowledge (e.g. a `NOT_FOUND` that is known to resolve once a
/// lagging registration catches up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DeadlineExceeded,
}

impl ErrorCode {
    /// Whether this code is retryable by default, absent a more specific override.
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::DeadlineExceeded | ErrorCode::Unavailable | ErrorCode::Aborted
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorCode::Aborted => "ABORTED",
            ErrorCode::OutOfRange => "OUT_OF_RANGE",
            ErrorCode::Unimplemented => "UNIMPLEMENTED",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
        };
        f.write_str(s)
    }
}
