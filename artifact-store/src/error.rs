//! Error taxonomy for the Artifact Store (§4.4).

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactStoreError {
    #[error("artifact {0} not found")]
    NotFound(Uuid),

    #[error("blob for artifact {0} is missing from storage")]
    BlobMissing(Uuid),

    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("invalid artifact manifest: {0}")]
    InvalidManifest(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ArtifactStoreError {
    /// Whether retrying the operation without operator intervention could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Catalog(_) | Self::Io(_) | Self::Join(_))
    }
}

pub type ArtifactStoreResult<T> = Result<T, ArtifactStoreError>;
