//! Bus configuration, merged from defaults, an optional file, and the environment.
//!
//! Named `DEFAULT_*` constants, a `Default` impl built from them, a fluent
//! builder with `validate()`, and a `from_env` constructor layered on the
//! `config` crate for the file/env merge.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5672;
pub const DEFAULT_EXCHANGE_NAME: &str = "ai_team";
pub const DEFAULT_HEARTBEAT_SECONDS: u64 = 300;
pub const DEFAULT_BLOCKED_CONNECTION_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_STRICT_MODE: bool = true;

/// Connection and validation settings for a [`crate::bus::MessageBus`] (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub exchange_name: String,
    pub heartbeat: Duration,
    pub blocked_connection_timeout: Duration,
    /// When true, an unknown field in a payload is a validation failure rather
    /// than being silently ignored ("strict mode" from §4.1).
    pub strict_mode: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: "guest".to_string(),
            password: "guest".to_string(),
            exchange_name: DEFAULT_EXCHANGE_NAME.to_string(),
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECONDS),
            blocked_connection_timeout: Duration::from_secs(
                DEFAULT_BLOCKED_CONNECTION_TIMEOUT_SECONDS,
            ),
            strict_mode: DEFAULT_STRICT_MODE,
        }
    }
}

impl BusConfig {
    pub fn builder() -> BusConfigBuilder {
        BusConfigBuilder::default()
    }

    /// Merge file (`path`, if it exists) and `MINDBUS__*`-prefixed environment
    /// overrides on top of [`BusConfig::default`].
    pub fn from_env(path: Option<&str>) -> Result<Self, crate::error::BusError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MINDBUS")
                .separator("__")
                .try_parsing(true),
        );
        let merged = builder
            .build()
            .map_err(|e| crate::error::BusError::Config(e.to_string()))?;
        let overrides: PartialBusConfig = merged
            .try_deserialize()
            .map_err(|e| crate::error::BusError::Config(e.to_string()))?;
        Ok(overrides.apply_onto(BusConfig::default()))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.exchange_name.is_empty() {
            return Err("exchange_name must not be empty".to_string());
        }
        if self.heartbeat.is_zero() {
            return Err("heartbeat must be > 0".to_string());
        }
        Ok(())
    }
}

/// Sparse overlay deserialized from config file / environment sources; every
/// field is optional so that an unset key falls through to the programmatic
/// default instead of failing deserialization.
#[derive(Debug, Default, Deserialize)]
struct PartialBusConfig {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    exchange_name: Option<String>,
    heartbeat_seconds: Option<u64>,
    blocked_connection_timeout_seconds: Option<u64>,
    strict_mode: Option<bool>,
}

impl PartialBusConfig {
    fn apply_onto(self, mut base: BusConfig) -> BusConfig {
        if let Some(v) = self.host {
            base.host = v;
        }
        if let Some(v) = self.port {
            base.port = v;
        }
        if let Some(v) = self.username {
            base.username = v;
        }
        if let Some(v) = self.password {
            base.password = v;
        }
        if let Some(v) = self.exchange_name {
            base.exchange_name = v;
        }
        if let Some(v) = self.heartbeat_seconds {
            base.heartbeat = Duration::from_secs(v);
        }
        if let Some(v) = self.blocked_connection_timeout_seconds {
            base.blocked_connection_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.strict_mode {
            base.strict_mode = v;
        }
        base
    }
}

#[derive(Debug, Default)]
pub struct BusConfigBuilder {
    config: BusConfig,
}

impl BusConfigBuilder {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn with_exchange_name(mut self, exchange_name: impl Into<String>) -> Self {
        self.config.exchange_name = exchange_name.into();
        self
    }

    pub fn with_strict_mode(mut self, strict_mode: bool) -> Self {
        self.config.strict_mode = strict_mode;
        self
    }

    pub fn build(self) -> Result<BusConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(BusConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_exchange_name_fails_validation() {
        let config = BusConfig::builder().with_exchange_name("").build();
        assert!(config.is_err());
    }

    #[test]
    fn builder_overrides_apply() {
        let config = BusConfig::builder()
            .with_host("broker.internal")
            .with_port(5673)
            .with_exchange_name("custom")
            .with_strict_mode(false)
            .build()
            .unwrap();

        assert_eq!(config.host, "broker.internal");
        assert_eq!(config.port, 5673);
        assert_eq!(config.exchange_name, "custom");
        assert!(!config.strict_mode);
    }

    #[test]
    fn from_env_falls_back_to_defaults_without_a_file_or_overrides() {
        let config = BusConfig::from_env(None).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn from_env_applies_environment_overrides() {
        // SAFETY: test runs single-threaded per process for this var; scoped to this test.
        std::env::set_var("MINDBUS__HOST", "broker.example");
        std::env::set_var("MINDBUS__PORT", "5999");
        let config = BusConfig::from_env(None).unwrap();
        std::env::remove_var("MINDBUS__HOST");
        std::env::remove_var("MINDBUS__PORT");

        assert_eq!(config.host, "broker.example");
        assert_eq!(config.port, 5999);
    }
}
