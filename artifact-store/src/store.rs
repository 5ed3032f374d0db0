//! [`ArtifactStore`]: the public API over catalog + blobs + degraded-mode
//! buffer (§4.4). All blocking I/O (rusqlite, filesystem) runs inside
//! `spawn_blocking` so the async caller never blocks the executor, even
//! though each operation is synchronous from the caller's point of view
//! (§5 "Artifact Store: blocks on filesystem and catalog I/O").

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blobs;
use crate::buffer;
use crate::catalog::{self, ListFilter};
use crate::config::ArtifactStoreConfig;
use crate::error::{ArtifactStoreError, ArtifactStoreResult};
use crate::manifest::{checksum_of, Artifact, ArtifactStatus, Visibility};

#[derive(Clone)]
pub struct ArtifactStore {
    config: ArtifactStoreConfig,
    conn: Arc<Mutex<Connection>>,
}

/// Parameters for [`ArtifactStore::register_artifact`], grouped so the method
/// signature doesn't grow another positional argument every time §4.4 gains
/// an optional field.
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub artifact_type: String,
    pub trace_id: Uuid,
    pub created_by: String,
    pub filename: String,
    pub content_type: String,
    pub step_id: Option<String>,
    pub visibility: Visibility,
    pub context: Option<serde_json::Value>,
}

impl ArtifactStore {
    /// Open (creating if absent) the catalog and directory layout at
    /// `config.root`, then run startup recovery (§4.4 "Recovery on startup").
    pub async fn open(config: ArtifactStoreConfig) -> ArtifactStoreResult<Self> {
        buffer::ensure_layout(&config)?;
        let catalog_path = config.catalog_path();
        let conn = tokio::task::spawn_blocking(move || catalog::open(&catalog_path)).await??;
        let store = Self {
            config,
            conn: Arc::new(Mutex::new(conn)),
        };
        store.recover().await?;
        Ok(store)
    }

    async fn recover(&self) -> ArtifactStoreResult<()> {
        self.recover_uploading_rows().await?;
        self.recover_buffer().await?;
        Ok(())
    }

    /// §4.4 recovery step 1: promote or fail rows stuck at `uploading`.
    async fn recover_uploading_rows(&self) -> ArtifactStoreResult<()> {
        let conn = self.conn.clone();
        let pending = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            catalog::list_uploading(&conn)
        })
        .await??;

        for artifact in pending {
            if blobs::exists(Path::new(&artifact.uri)) {
                info!(artifact_id = %artifact.id, "promoting uploading row with an existing blob");
                let conn = self.conn.clone();
                let uri = artifact.uri.clone();
                let id = artifact.id;
                tokio::task::spawn_blocking(move || {
                    let conn = conn.blocking_lock();
                    catalog::commit(&conn, id, &uri)
                })
                .await??;
            } else {
                warn!(artifact_id = %artifact.id, "marking uploading row failed, blob missing");
                let conn = self.conn.clone();
                let id = artifact.id;
                tokio::task::spawn_blocking(move || {
                    let conn = conn.blocking_lock();
                    catalog::mark_failed(&conn, id)
                })
                .await??;
            }
        }
        Ok(())
    }

    /// §4.4 recovery step 2: replay buffered registrations; leave failures
    /// in the buffer for the next pass.
    async fn recover_buffer(&self) -> ArtifactStoreResult<()> {
        let config = self.config.clone();
        let ids = tokio::task::spawn_blocking(move || buffer::list_buffered(&config)).await??;

        for id in ids {
            let config = self.config.clone();
            let (content, manifest) =
                match tokio::task::spawn_blocking(move || buffer::load(&config, id)).await? {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(artifact_id = %id, error = %e, "buffered entry unreadable, leaving in place");
                        continue;
                    }
                };

            match self.commit_registration(manifest, &content).await {
                Ok(_) => {
                    let config = self.config.clone();
                    tokio::task::spawn_blocking(move || buffer::remove(&config, id)).await??;
                    info!(artifact_id = %id, "replayed buffered artifact into the catalog");
                }
                Err(e) => warn!(artifact_id = %id, error = %e, "buffered artifact still cannot be registered"),
            }
        }
        Ok(())
    }

    /// §4.4 "Registration (happy path)". On a transient failure, the bytes
    /// and manifest fall back to the degraded-mode buffer instead of being
    /// lost, and the returned manifest keeps `status = uploading`.
    pub async fn register_artifact(
        &self,
        content: Vec<u8>,
        request: RegisterRequest,
    ) -> ArtifactStoreResult<Artifact> {
        let artifact_id = Uuid::new_v4();
        let checksum = checksum_of(&content);
        let manifest = Artifact {
            id: artifact_id,
            version: 1,
            trace_id: request.trace_id,
            step_id: request.step_id,
            created_by: request.created_by.clone(),
            artifact_type: request.artifact_type,
            content_type: request.content_type,
            uri: blobs::temp_path(&self.config, artifact_id, &request.filename)
                .to_string_lossy()
                .into_owned(),
            size_bytes: content.len() as u64,
            checksum,
            status: ArtifactStatus::Uploading,
            owner: request.created_by,
            visibility: request.visibility,
            context: request.context,
            created_at: Utc::now(),
        };

        match self.commit_registration(manifest.clone(), &content).await {
            Ok(committed) => Ok(committed),
            Err(e) if e.is_retryable() => {
                warn!(artifact_id = %artifact_id, error = %e, "registration failed transiently, buffering");
                let config = self.config.clone();
                let buffered = manifest.clone();
                tokio::task::spawn_blocking(move || buffer::stash(&config, &buffered, &content))
                    .await??;
                Ok(manifest)
            }
            Err(e) => Err(e),
        }
    }

    /// Runs §4.4 steps 2-7 for a manifest that already has its `filename`
    /// encoded in `uri`'s temp path. Shared by [`Self::register_artifact`]
    /// and buffer replay.
    async fn commit_registration(&self, manifest: Artifact, content: &[u8]) -> ArtifactStoreResult<Artifact> {
        let filename = Path::new(&manifest.uri)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| manifest.id.to_string());
        let temp = blobs::temp_path(&self.config, manifest.id, &filename);
        let permanent = blobs::permanent_path(&self.config, manifest.trace_id, manifest.id, &filename);

        let write_path = temp.clone();
        let write_content = content.to_vec();
        tokio::task::spawn_blocking(move || blobs::write_temp(&write_path, &write_content)).await??;

        let conn = self.conn.clone();
        let insert_manifest = manifest.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            catalog::insert_uploading(&mut conn, &insert_manifest)
        })
        .await??;

        let rename_temp = temp.clone();
        let rename_permanent = permanent.clone();
        tokio::task::spawn_blocking(move || blobs::commit_rename(&rename_temp, &rename_permanent)).await??;

        let conn = self.conn.clone();
        let id = manifest.id;
        let permanent_uri = permanent.to_string_lossy().into_owned();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            catalog::commit(&conn, id, &permanent_uri)
        })
        .await??;

        let mut committed = manifest;
        committed.uri = permanent.to_string_lossy().into_owned();
        committed.status = ArtifactStatus::Completed;
        Ok(committed)
    }

    pub async fn get_artifact(&self, id: Uuid) -> ArtifactStoreResult<Artifact> {
        let conn = self.conn.clone();
        let found = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            catalog::get(&conn, id)
        })
        .await??;
        found.ok_or(ArtifactStoreError::NotFound(id))
    }

    pub async fn get_artifact_content(&self, id: Uuid) -> ArtifactStoreResult<Vec<u8>> {
        let artifact = self.get_artifact(id).await?;
        let path = std::path::PathBuf::from(&artifact.uri);
        if !blobs::exists(&path) {
            return Err(ArtifactStoreError::BlobMissing(id));
        }
        tokio::task::spawn_blocking(move || blobs::read(&path)).await?
    }

    /// Recompute the checksum over the stored blob and compare against the
    /// catalog record.
    pub async fn verify_artifact(&self, id: Uuid) -> ArtifactStoreResult<bool> {
        let artifact = self.get_artifact(id).await?;
        let content = self.get_artifact_content(id).await?;
        Ok(artifact.checksum_matches(&content))
    }

    pub async fn list_artifacts(&self, filter: ListFilter) -> ArtifactStoreResult<Vec<Artifact>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            catalog::list(&conn, &filter)
        })
        .await?
    }

    /// §4.4 "Deletion": move the blob to `orphans/`, then drop the catalog
    /// row — the reverse order of registration.
    pub async fn delete_artifact(&self, id: Uuid) -> ArtifactStoreResult<()> {
        let artifact = self.get_artifact(id).await?;
        let config = self.config.clone();
        let blob_path = std::path::PathBuf::from(&artifact.uri);
        tokio::task::spawn_blocking(move || blobs::move_to_orphans(&config, &blob_path)).await??;

        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            catalog::delete(&conn, id)
        })
        .await??;
        Ok(())
    }

    pub async fn cleanup_temp_files(&self, older_than_hours: u64) -> ArtifactStoreResult<usize> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || blobs::cleanup_temp_files(&config, older_than_hours)).await?
    }
}
