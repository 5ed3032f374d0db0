//! The degraded-mode write buffer (§4.4 "Degraded mode"). When registration
//! hits a transient failure, bytes + manifest are stashed in
//! `buffer/<artifact_id>/{content.bin, manifest.json}` and replayed on the
//! next recovery pass. Bounded FIFO: oldest entry evicted on overflow.

use std::fs;
use std::path::Path;

use uuid::Uuid;

use crate::config::ArtifactStoreConfig;
use crate::error::ArtifactStoreResult;
use crate::manifest::Artifact;

/// Stash `content` + `manifest` under `buffer/<id>/`, evicting the oldest
/// buffered entries first if either cap would be exceeded.
pub fn stash(
    config: &ArtifactStoreConfig,
    manifest: &Artifact,
    content: &[u8],
) -> ArtifactStoreResult<()> {
    let dir = config.buffer_dir().join(manifest.id.to_string());
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("content.bin"), content)?;
    fs::write(dir.join("manifest.json"), serde_json::to_vec(manifest)?.as_slice())?;

    enforce_caps(config)?;
    Ok(())
}

/// Evict oldest-first until both `buffer_max_items` and `buffer_max_size_mb`
/// are satisfied.
fn enforce_caps(config: &ArtifactStoreConfig) -> ArtifactStoreResult<()> {
    let max_bytes = config.buffer_max_size_mb * 1024 * 1024;
    loop {
        let mut entries = buffered_entries(config)?;
        let total_bytes: u64 = entries.iter().map(|e| e.size_bytes).sum();
        if entries.len() <= config.buffer_max_items && total_bytes <= max_bytes {
            return Ok(());
        }
        entries.sort_by_key(|e| e.modified);
        if let Some(oldest) = entries.first() {
            remove(config, oldest.id)?;
        } else {
            return Ok(());
        }
    }
}

struct BufferedEntry {
    id: Uuid,
    size_bytes: u64,
    modified: std::time::SystemTime,
}

fn buffered_entries(config: &ArtifactStoreConfig) -> ArtifactStoreResult<Vec<BufferedEntry>> {
    let root = config.buffer_dir();
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(&root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Ok(id) = Uuid::parse_str(&entry.file_name().to_string_lossy()) else {
            continue;
        };
        let content_path = entry.path().join("content.bin");
        let metadata = fs::metadata(&content_path)?;
        entries.push(BufferedEntry {
            id,
            size_bytes: metadata.len(),
            modified: metadata.modified()?,
        });
    }
    Ok(entries)
}

/// All artifact ids currently buffered, oldest first (replay order for
/// recovery).
pub fn list_buffered(config: &ArtifactStoreConfig) -> ArtifactStoreResult<Vec<Uuid>> {
    let mut entries = buffered_entries(config)?;
    entries.sort_by_key(|e| e.modified);
    Ok(entries.into_iter().map(|e| e.id).collect())
}

pub fn load(config: &ArtifactStoreConfig, id: Uuid) -> ArtifactStoreResult<(Vec<u8>, Artifact)> {
    let dir = config.buffer_dir().join(id.to_string());
    let content = fs::read(dir.join("content.bin"))?;
    let manifest_bytes = fs::read(dir.join("manifest.json"))?;
    let manifest: Artifact = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| crate::error::ArtifactStoreError::InvalidManifest(e.to_string()))?;
    Ok((content, manifest))
}

pub fn remove(config: &ArtifactStoreConfig, id: Uuid) -> ArtifactStoreResult<()> {
    let dir = config.buffer_dir().join(id.to_string());
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    Ok(())
}

pub fn ensure_layout(config: &ArtifactStoreConfig) -> ArtifactStoreResult<()> {
    for dir in [
        config.artifacts_dir(),
        config.temp_dir(),
        config.buffer_dir(),
        config.orphans_dir(),
    ] {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}
