//! Orchestrator runtime limits (§4.3): the wait-step cap and the loop safety bound.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

pub const DEFAULT_MAX_WAIT_SECONDS: u64 = 10;
pub const DEFAULT_LOOP_SAFETY_MULTIPLIER: usize = 2;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Named `DEFAULT_*` constants, a `Default` impl, a fluent builder with
/// `validate()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Runtime cap on a `wait` step's `duration`, regardless of what the card asks
    /// for (§4.3: "Bounded by a runtime cap ... to keep executors responsive").
    pub max_wait: Duration,
    /// Multiplier in the hard loop bound `len(steps) * (max_retries + 1) * multiplier`.
    pub loop_safety_multiplier: usize,
    /// Default timeout for an `execute` step that doesn't declare its own.
    pub default_request_timeout: Duration,
    /// Identity used to build this instance's durable reply queue name.
    pub instance_id: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECONDS),
            loop_safety_multiplier: DEFAULT_LOOP_SAFETY_MULTIPLIER,
            default_request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            instance_id: "default".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_wait.is_zero() {
            return Err("max_wait must be > 0".to_string());
        }
        if self.loop_safety_multiplier == 0 {
            return Err("loop_safety_multiplier must be > 0".to_string());
        }
        if self.instance_id.is_empty() {
            return Err("instance_id must not be empty".to_string());
        }
        Ok(())
    }

    /// This instance's durable reply queue, per the chosen one-queue-per-instance
    /// topology: `orchestrator.reply.<instance-id>`.
    pub fn reply_queue(&self) -> String {
        format!("orchestrator.reply.{}", self.instance_id)
    }

    pub fn from_env(path: Option<&str>) -> Result<Self, OrchestratorError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ORCHESTRATOR")
                .separator("__")
                .try_parsing(true),
        );
        let merged = builder
            .build()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;
        let overrides: PartialOrchestratorConfig = merged
            .try_deserialize()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;
        Ok(overrides.apply_onto(OrchestratorConfig::default()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialOrchestratorConfig {
    max_wait_seconds: Option<u64>,
    loop_safety_multiplier: Option<usize>,
    default_request_timeout_seconds: Option<u64>,
    instance_id: Option<String>,
}

impl PartialOrchestratorConfig {
    fn apply_onto(self, mut base: OrchestratorConfig) -> OrchestratorConfig {
        if let Some(v) = self.max_wait_seconds {
            base.max_wait = Duration::from_secs(v);
        }
        if let Some(v) = self.loop_safety_multiplier {
            base.loop_safety_multiplier = v;
        }
        if let Some(v) = self.default_request_timeout_seconds {
            base.default_request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.instance_id {
            base.instance_id = v;
        }
        base
    }
}

#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.config.max_wait = max_wait;
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.config.instance_id = instance_id.into();
        self
    }

    pub fn build(self) -> Result<OrchestratorConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(OrchestratorConfig::default().validate().is_ok());
    }

    #[test]
    fn reply_queue_includes_instance_id() {
        let config = OrchestratorConfig::builder()
            .with_instance_id("inst-42")
            .build()
            .unwrap();
        assert_eq!(config.reply_queue(), "orchestrator.reply.inst-42");
    }
}
