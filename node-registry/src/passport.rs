//! The Node Passport: the self-description a node publishes on `evt.node.registered`
//! and the record the [`crate::registry::Registry`] keeps for it (§3.3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of node a passport describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Orchestrator,
    Agent,
    Storage,
    Gateway,
}

/// Lifecycle phase of a node, as it reports on its own `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodePhase {
    Pending,
    Running,
    Degraded,
    Terminated,
}

/// A single capability a node advertises, the unit the Orchestrator dispatches by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// How to reach a node: the bus routing target, not a raw socket address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub protocol: String,
    /// The command queue's routing-key target, e.g. a node uid.
    pub queue: String,
}

/// A condition reported in `status.conditions`, mirroring the Kubernetes-style
/// condition list the source data model calls for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub condition_type: String,
    pub status: bool,
    pub reason: Option<String>,
    pub last_transition: DateTime<Utc>,
}

/// The lease a node holds; `renew_time` is bumped on every heartbeat and is what the
/// sweeper compares against `ttl_seconds` (§4.2 "Sweeper").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub holder_identity: Uuid,
    pub lease_duration_seconds: u64,
    pub renew_time: DateTime<Utc>,
}

/// Mutable runtime status of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub phase: NodePhase,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub lease: Lease,
    pub current_tasks: u32,
    pub total_tasks_processed: u64,
}

/// Identity and labels; `uid` and `name` are each unique across the live registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub uid: Uuid,
    pub name: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub version: String,
}

/// The static shape a node declares at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub capabilities: Vec<Capability>,
    pub endpoint: Endpoint,
    #[serde(default)]
    pub configuration: serde_json::Map<String, serde_json::Value>,
}

/// The full self-description a node publishes, §3.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePassport {
    pub metadata: NodeMetadata,
    pub spec: NodeSpec,
    pub status: NodeStatus,
}

impl NodePassport {
    pub fn has_capability(&self, name: &str) -> bool {
        self.spec.capabilities.iter().any(|c| c.name == name)
    }

    pub fn matches_labels(&self, selector: &HashMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.metadata.labels.get(k) == Some(v))
    }
}
