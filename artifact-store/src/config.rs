//! Storage root, degraded-mode buffer limits, and cleanup timing (§4.4, §6).

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ArtifactStoreResult;

pub const DEFAULT_BUFFER_MAX_ITEMS: usize = 256;
pub const DEFAULT_BUFFER_MAX_SIZE_MB: u64 = 512;
pub const DEFAULT_TEMP_FILE_MAX_AGE_HOURS: u64 = 24;

/// Filesystem layout and degraded-mode limits. Mirrors the registry's
/// `*Config::from_env` overlay pattern: `Default` + fluent builder + environment
/// overrides via the `config` crate.
#[derive(Debug, Clone)]
pub struct ArtifactStoreConfig {
    /// Root directory; `artifacts/`, `temp/`, `buffer/`, `orphans/`, and
    /// `catalog.db` all live under it (§6 "Persisted state layout").
    pub root: PathBuf,
    pub buffer_max_items: usize,
    pub buffer_max_size_mb: u64,
    pub temp_file_max_age_hours: u64,
}

impl Default for ArtifactStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/artifact-store"),
            buffer_max_items: DEFAULT_BUFFER_MAX_ITEMS,
            buffer_max_size_mb: DEFAULT_BUFFER_MAX_SIZE_MB,
            temp_file_max_age_hours: DEFAULT_TEMP_FILE_MAX_AGE_HOURS,
        }
    }
}

impl ArtifactStoreConfig {
    pub fn builder() -> ArtifactStoreConfigBuilder {
        ArtifactStoreConfigBuilder::default()
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    pub fn buffer_dir(&self) -> PathBuf {
        self.root.join("buffer")
    }

    pub fn orphans_dir(&self) -> PathBuf {
        self.root.join("orphans")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog.db")
    }

    pub fn from_env(path: Option<&str>) -> ArtifactStoreResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ARTIFACT_STORE")
                .separator("__")
                .try_parsing(true),
        );
        let merged = builder.build()?;
        let overrides: PartialArtifactStoreConfig = merged.try_deserialize()?;
        Ok(overrides.apply_onto(ArtifactStoreConfig::default()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialArtifactStoreConfig {
    root: Option<PathBuf>,
    buffer_max_items: Option<usize>,
    buffer_max_size_mb: Option<u64>,
    temp_file_max_age_hours: Option<u64>,
}

impl PartialArtifactStoreConfig {
    fn apply_onto(self, mut base: ArtifactStoreConfig) -> ArtifactStoreConfig {
        if let Some(v) = self.root {
            base.root = v;
        }
        if let Some(v) = self.buffer_max_items {
            base.buffer_max_items = v;
        }
        if let Some(v) = self.buffer_max_size_mb {
            base.buffer_max_size_mb = v;
        }
        if let Some(v) = self.temp_file_max_age_hours {
            base.temp_file_max_age_hours = v;
        }
        base
    }
}

#[derive(Debug, Default)]
pub struct ArtifactStoreConfigBuilder {
    config: ArtifactStoreConfig,
}

impl ArtifactStoreConfigBuilder {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = root.into();
        self
    }

    pub fn with_buffer_max_items(mut self, items: usize) -> Self {
        self.config.buffer_max_items = items;
        self
    }

    pub fn with_buffer_max_size_mb(mut self, size_mb: u64) -> Self {
        self.config.buffer_max_size_mb = size_mb;
        self
    }

    pub fn build(self) -> ArtifactStoreConfig {
        self.config
    }
}
