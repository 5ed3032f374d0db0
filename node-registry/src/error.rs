//! Registry error types.

use thiserror::Error;
use uuid::Uuid;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("node uid {0} is already registered")]
    DuplicateUid(Uuid),

    #[error("node name '{0}' is already registered")]
    DuplicateName(String),

    #[error("node {0} is not registered")]
    NotFound(Uuid),

    #[error("bus error: {0}")]
    Bus(#[from] mindbus::BusError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Bus(e) if e.is_retryable())
    }
}
