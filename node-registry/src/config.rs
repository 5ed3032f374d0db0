//! Registry and sweeper timing configuration (§3.3, §4.2).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_TTL_SECONDS: u64 = 90;
pub const DEFAULT_CLEANUP_INTERVAL_SECONDS: u64 = 15;

/// Sweeper and lease timing: named `DEFAULT_*` constants, a `Default` impl, a
/// fluent builder with `validate()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub heartbeat_interval: Duration,
    pub ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECONDS),
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECONDS),
        }
    }
}

impl RegistryConfig {
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }

    /// Validate the §3.3 invariant `ttl_seconds >= 2 * heartbeat_interval_seconds`.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl < self.heartbeat_interval * 2 {
            return Err(format!(
                "ttl ({:?}) must be at least twice heartbeat_interval ({:?})",
                self.ttl, self.heartbeat_interval
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err("cleanup_interval must be > 0".to_string());
        }
        Ok(())
    }

    /// The point at which the sweeper demotes an `alive` node to `not_ready`
    /// (§4.2: "`now − last_seen > ttl/2` and state was `alive`").
    pub fn demotion_threshold(&self) -> Duration {
        self.ttl / 2
    }

    pub fn from_env(path: Option<&str>) -> Result<Self, RegistryError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("NODE_REGISTRY")
                .separator("__")
                .try_parsing(true),
        );
        let merged = builder
            .build()
            .map_err(|e| RegistryError::Config(e.to_string()))?;
        let overrides: PartialRegistryConfig = merged
            .try_deserialize()
            .map_err(|e| RegistryError::Config(e.to_string()))?;
        Ok(overrides.apply_onto(RegistryConfig::default()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialRegistryConfig {
    heartbeat_interval_seconds: Option<u64>,
    ttl_seconds: Option<u64>,
    cleanup_interval_seconds: Option<u64>,
}

impl PartialRegistryConfig {
    fn apply_onto(self, mut base: RegistryConfig) -> RegistryConfig {
        if let Some(v) = self.heartbeat_interval_seconds {
            base.heartbeat_interval = Duration::from_secs(v);
        }
        if let Some(v) = self.ttl_seconds {
            base.ttl = Duration::from_secs(v);
        }
        if let Some(v) = self.cleanup_interval_seconds {
            base.cleanup_interval = Duration::from_secs(v);
        }
        base
    }
}

#[derive(Debug, Default)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    pub fn build(self) -> Result<RegistryConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RegistryConfig::default().validate().is_ok());
    }

    #[test]
    fn ttl_must_be_at_least_twice_heartbeat() {
        let config = RegistryConfig::builder()
            .with_heartbeat_interval(Duration::from_secs(60))
            .with_ttl(Duration::from_secs(90))
            .build();
        assert!(config.is_err());
    }

    #[test]
    fn demotion_threshold_is_half_ttl() {
        let config = RegistryConfig::default();
        assert_eq!(config.demotion_threshold(), config.ttl / 2);
    }
}
