//! Errors a [`crate::provider::CapabilityProvider`] can return, and the fixed
//! exception→code table that turns them into `ErrorPayload.error.code` (§9
//! "Exception-to-error-code mapping: implement as an explicit table plus a
//! default `INTERNAL`").

use mindbus::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("not implemented: {0}")]
    Unimplemented(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("bus error: {0}")]
    Bus(#[from] mindbus::BusError),
}

impl WorkerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::DeadlineExceeded(_) => ErrorCode::DeadlineExceeded,
            Self::Unavailable(_) | Self::Bus(_) => ErrorCode::Unavailable,
            Self::Unimplemented(_) => ErrorCode::Unimplemented,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::DeadlineExceeded(_) | Self::Bus(_))
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;
