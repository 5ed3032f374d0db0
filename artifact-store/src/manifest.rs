//! The Artifact manifest (§3.5): the catalog row's in-memory shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Uploading,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Trace,
    Public,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Private
    }
}

/// The catalog's metadata record for one artifact (§3.5). Fields other than
/// `uri` and `status` are frozen once `status` leaves `Uploading`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub version: i64,
    pub trace_id: Uuid,
    pub step_id: Option<String>,
    pub created_by: String,
    pub artifact_type: String,
    pub content_type: String,
    pub uri: String,
    pub size_bytes: u64,
    /// `sha256:<hex>`.
    pub checksum: String,
    pub status: ArtifactStatus,
    pub owner: String,
    pub visibility: Visibility,
    pub context: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn checksum_matches(&self, content: &[u8]) -> bool {
        self.checksum == checksum_of(content)
    }
}

/// `sha256:<hex>` over `content` (§3.5, §4.4 step 3).
pub fn checksum_of(content: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(content);
    format!("sha256:{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic_and_prefixed() {
        let a = checksum_of(b"hello");
        let b = checksum_of(b"hello");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn different_content_yields_different_checksum() {
        assert_ne!(checksum_of(b"hello"), checksum_of(b"world"));
    }
}
