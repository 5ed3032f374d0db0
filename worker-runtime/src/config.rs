//! Worker identity and heartbeat timing (§4.5).

use std::collections::HashMap;
use std::time::Duration;

use node_registry::NodeType;

pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 10;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    pub node_type: NodeType,
    pub version: String,
    pub labels: HashMap<String, String>,
    pub heartbeat_interval: Duration,
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            node_type,
            version: "1.0.0".to_string(),
            labels: HashMap::new(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECONDS),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// The sweeper demotes a node whose lease outlives `3 * heartbeat_interval`
    /// without a renewal (mirrors the source's `lease_duration_seconds =
    /// heartbeat_interval * 3`).
    pub fn lease_duration(&self) -> Duration {
        self.heartbeat_interval * 3
    }
}
