//! Orchestrator error types.

use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("invalid process card: {0}")]
    InvalidCard(String),

    #[error("no worker available for capability '{0}'")]
    NoWorkerAvailable(String),

    #[error("step '{0}' exceeded its loop safety bound")]
    LoopSafetyExceeded(String),

    #[error("malformed wait duration '{0}'")]
    InvalidDuration(String),

    #[error("condition evaluation failed: {0}")]
    ConditionEvaluation(String),

    #[error("bus error: {0}")]
    Bus(#[from] mindbus::BusError),

    #[error("registry error: {0}")]
    Registry(#[from] node_registry::RegistryError),

    #[error("artifact store error: {0}")]
    ArtifactStore(#[from] artifact_store::ArtifactStoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl OrchestratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestratorError::Bus(e) if e.is_retryable())
    }
}
