//! Blob filesystem operations (§4.4): staging, atomic rename into place,
//! soft-delete to `orphans/`, and temp-file cleanup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::config::ArtifactStoreConfig;
use crate::error::ArtifactStoreResult;

/// `temp/<artifact_id>_<filename>` (§4.4 step 2).
pub fn temp_path(config: &ArtifactStoreConfig, artifact_id: Uuid, filename: &str) -> PathBuf {
    config.temp_dir().join(format!("{artifact_id}_{filename}"))
}

/// `artifacts/<trace_id>/<artifact_id>_<filename>` (§4.4 storage layout).
pub fn permanent_path(
    config: &ArtifactStoreConfig,
    trace_id: Uuid,
    artifact_id: Uuid,
    filename: &str,
) -> PathBuf {
    config
        .artifacts_dir()
        .join(trace_id.to_string())
        .join(format!("{artifact_id}_{filename}"))
}

pub fn write_temp(path: &Path, content: &[u8]) -> ArtifactStoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

/// §4.4 step 6: rename must stay on one filesystem for atomicity (storage
/// layout note: "staging and permanent directory must reside on the same
/// filesystem").
pub fn commit_rename(temp: &Path, permanent: &Path) -> ArtifactStoreResult<()> {
    if let Some(parent) = permanent.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(temp, permanent)?;
    Ok(())
}

pub fn read(path: &Path) -> ArtifactStoreResult<Vec<u8>> {
    Ok(fs::read(path)?)
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Deletion (§4.4 "Deletion"): move the blob to `orphans/` before the catalog
/// row is removed. Missing blobs are not an error — the row is still dropped.
pub fn move_to_orphans(config: &ArtifactStoreConfig, blob: &Path) -> ArtifactStoreResult<()> {
    if !blob.exists() {
        return Ok(());
    }
    let orphans = config.orphans_dir();
    fs::create_dir_all(&orphans)?;
    let file_name = blob
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| format!("orphan-{}", Uuid::new_v4()).into());
    fs::rename(blob, orphans.join(file_name))?;
    Ok(())
}

/// `cleanup_temp_files(older_than_hours)` (§4.4 "Cleanup").
pub fn cleanup_temp_files(config: &ArtifactStoreConfig, older_than_hours: u64) -> ArtifactStoreResult<usize> {
    let cutoff = Duration::from_secs(older_than_hours * 3600);
    let now = SystemTime::now();
    let temp_dir = config.temp_dir();
    if !temp_dir.exists() {
        return Ok(0);
    }
    let mut moved = 0;
    for entry in fs::read_dir(&temp_dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let age = now
            .duration_since(metadata.modified()?)
            .unwrap_or(Duration::ZERO);
        if age >= cutoff {
            move_to_orphans(config, &entry.path())?;
            moved += 1;
        }
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &Path) -> ArtifactStoreConfig {
        ArtifactStoreConfig::builder().with_root(root).build()
    }

    #[test]
    fn write_temp_then_commit_rename_moves_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let artifact_id = Uuid::new_v4();
        let trace_id = Uuid::new_v4();

        let temp = temp_path(&config, artifact_id, "f.bin");
        write_temp(&temp, b"payload").unwrap();
        assert!(temp.exists());

        let permanent = permanent_path(&config, trace_id, artifact_id, "f.bin");
        commit_rename(&temp, &permanent).unwrap();
        assert!(!temp.exists());
        assert!(permanent.exists());
        assert_eq!(read(&permanent).unwrap(), b"payload");
    }

    #[test]
    fn move_to_orphans_is_a_no_op_for_a_missing_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let missing = config.artifacts_dir().join("nope.bin");
        assert!(move_to_orphans(&config, &missing).is_ok());
    }
}
