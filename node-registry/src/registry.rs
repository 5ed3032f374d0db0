//! The live node directory: a DashMap-backed map with FIFO-stable queries (§4.2).
//!
//! A concurrent map with cheap `Arc` clone, keyed on node uid, with health state
//! driven by a time-based sweeper rather than explicit unregister calls alone.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::passport::{NodePassport, NodeType};

/// Liveness as judged by the sweeper, §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Alive,
    NotReady,
    Offline,
}

/// One node's record in the registry.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub passport: NodePassport,
    pub last_seen: DateTime<Utc>,
    pub health_state: HealthState,
    pub registered_at: DateTime<Utc>,
}

/// Emitted on state transitions a caller (the Orchestrator, metrics, tests) may want
/// to observe without polling `find`.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Registered(Uuid),
    Deregistered(Uuid, String),
    Demoted(Uuid),
    Evicted(Uuid),
}

/// Filter arguments for [`Registry::find`]; all present fields are AND-composed.
#[derive(Debug, Clone, Default)]
pub struct NodeQuery<'a> {
    pub node_type: Option<NodeType>,
    pub capability: Option<&'a str>,
    pub selector: Option<&'a HashMap<String, String>>,
    pub only_healthy: bool,
}

/// The in-memory node directory. Cheap to clone (`Arc`-backed); every clone shares
/// the same underlying map.
#[derive(Clone)]
pub struct Registry {
    entries: Arc<DashMap<Uuid, RegistryEntry>>,
    names: Arc<DashMap<String, Uuid>>,
    events: tokio::sync::broadcast::Sender<RegistryEvent>,
}

impl Registry {
    pub fn new() -> Self {
        let (events, _) = tokio::sync::broadcast::channel(256);
        Self {
            entries: Arc::new(DashMap::new()),
            names: Arc::new(DashMap::new()),
            events,
        }
    }

    /// Subscribe to registry transitions. Lagging subscribers miss events rather
    /// than blocking the registry (events are lossy-by-design, per the bus's own
    /// broadcast-event semantics).
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register a new node. Rejects duplicates by `uid` or `name` (§3.3 invariant).
    pub fn register_node(&self, passport: NodePassport) -> RegistryResult<()> {
        let uid = passport.metadata.uid;
        let name = passport.metadata.name.clone();

        if self.entries.contains_key(&uid) {
            return Err(RegistryError::DuplicateUid(uid));
        }
        if self.names.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let now = Utc::now();
        self.names.insert(name, uid);
        self.entries.insert(
            uid,
            RegistryEntry {
                passport,
                last_seen: now,
                health_state: HealthState::Alive,
                registered_at: now,
            },
        );

        debug!(%uid, "node registered");
        let _ = self.events.send(RegistryEvent::Registered(uid));
        Ok(())
    }

    /// Bump `last_seen`, mark `alive`, and advance the passport's lease renewal time.
    /// An unknown uid is logged and ignored (§4.2), not an error: a heartbeat from a
    /// node the registry has already evicted is expected, not exceptional.
    pub fn update_heartbeat(&self, uid: Uuid) {
        let Some(mut entry) = self.entries.get_mut(&uid) else {
            warn!(%uid, "heartbeat from unknown node, ignoring");
            return;
        };
        let now = Utc::now();
        entry.last_seen = now;
        entry.health_state = HealthState::Alive;
        entry.passport.status.lease.renew_time = now;
    }

    /// Remove a node and fire [`RegistryEvent::Deregistered`].
    pub fn deregister_node(&self, uid: Uuid, reason: impl Into<String>) -> RegistryResult<()> {
        let Some((_, entry)) = self.entries.remove(&uid) else {
            return Err(RegistryError::NotFound(uid));
        };
        self.names.remove(&entry.passport.metadata.name);
        let _ = self
            .events
            .send(RegistryEvent::Deregistered(uid, reason.into()));
        Ok(())
    }

    /// Run one sweep pass: demote stale `alive` nodes, evict nodes past `ttl`.
    ///
    /// Returns the uids evicted this pass, for callers (e.g. the Orchestrator) that
    /// want to react to a worker disappearing mid-task.
    pub fn sweep(&self, config: &RegistryConfig) -> Vec<Uuid> {
        let now = Utc::now();
        let demotion_threshold = config.demotion_threshold();
        let mut evicted = Vec::new();

        let stale: Vec<Uuid> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let age = now.signed_duration_since(entry.last_seen).to_std().ok()?;
                if age > config.ttl {
                    Some(*entry.key())
                } else {
                    None
                }
            })
            .collect();

        for uid in stale {
            if self.entries.remove(&uid).is_some() {
                evicted.push(uid);
                let _ = self.events.send(RegistryEvent::Evicted(uid));
            }
        }

        for mut entry in self.entries.iter_mut() {
            if entry.health_state != HealthState::Alive {
                continue;
            }
            let age = match now.signed_duration_since(entry.last_seen).to_std() {
                Ok(age) => age,
                Err(_) => continue,
            };
            if age > demotion_threshold {
                entry.health_state = HealthState::NotReady;
                let uid = *entry.key();
                let _ = self.events.send(RegistryEvent::Demoted(uid));
            }
        }

        evicted
    }

    /// Find nodes matching `query`, in stable `registered_at`-ascending (FIFO) order.
    ///
    /// FIFO is a deliberate simplification (§4.2): predictable, not load-aware.
    pub fn find(&self, query: &NodeQuery<'_>) -> Vec<NodePassport> {
        let mut matches: Vec<(DateTime<Utc>, NodePassport)> = self
            .entries
            .iter()
            .filter(|entry| {
                if query.only_healthy && entry.health_state != HealthState::Alive {
                    return false;
                }
                if let Some(node_type) = query.node_type {
                    if entry.passport.metadata.node_type != node_type {
                        return false;
                    }
                }
                if let Some(capability) = query.capability {
                    if !entry.passport.has_capability(capability) {
                        return false;
                    }
                }
                if let Some(selector) = query.selector {
                    if !entry.passport.matches_labels(selector) {
                        return false;
                    }
                }
                true
            })
            .map(|entry| (entry.registered_at, entry.passport.clone()))
            .collect();

        matches.sort_by_key(|(registered_at, _)| *registered_at);
        matches.into_iter().map(|(_, passport)| passport).collect()
    }

    pub fn get(&self, uid: Uuid) -> Option<NodePassport> {
        self.entries.get(&uid).map(|e| e.passport.clone())
    }

    pub fn health_state(&self, uid: Uuid) -> Option<HealthState> {
        self.entries.get(&uid).map(|e| e.health_state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passport::{Capability, Endpoint, Lease, NodeMetadata, NodePhase, NodeSpec, NodeStatus};
    use std::time::Duration as StdDuration;

    fn passport(uid: Uuid, name: &str, capability: &str) -> NodePassport {
        let now = Utc::now();
        NodePassport {
            metadata: NodeMetadata {
                uid,
                name: name.to_string(),
                node_type: NodeType::Agent,
                labels: HashMap::new(),
                version: "1.0.0".to_string(),
            },
            spec: NodeSpec {
                capabilities: vec![Capability {
                    name: capability.to_string(),
                    version: "1.0.0".to_string(),
                    parameters: serde_json::Map::new(),
                }],
                endpoint: Endpoint {
                    protocol: "amqp".to_string(),
                    queue: uid.to_string(),
                },
                configuration: serde_json::Map::new(),
            },
            status: NodeStatus {
                phase: NodePhase::Running,
                conditions: Vec::new(),
                lease: Lease {
                    holder_identity: uid,
                    lease_duration_seconds: 30,
                    renew_time: now,
                },
                current_tasks: 0,
                total_tasks_processed: 0,
            },
        }
    }

    #[test]
    fn register_rejects_duplicate_uid() {
        let registry = Registry::new();
        let uid = Uuid::new_v4();
        registry.register_node(passport(uid, "writer-1", "write")).unwrap();
        let result = registry.register_node(passport(uid, "writer-2", "write"));
        assert!(matches!(result, Err(RegistryError::DuplicateUid(_))));
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let registry = Registry::new();
        registry
            .register_node(passport(Uuid::new_v4(), "writer-1", "write"))
            .unwrap();
        let result = registry.register_node(passport(Uuid::new_v4(), "writer-1", "write"));
        assert!(matches!(result, Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn heartbeat_from_unknown_node_is_ignored_not_an_error() {
        let registry = Registry::new();
        registry.update_heartbeat(Uuid::new_v4());
    }

    #[test]
    fn find_filters_by_capability_and_health() {
        let registry = Registry::new();
        let writer = Uuid::new_v4();
        let reader = Uuid::new_v4();
        registry.register_node(passport(writer, "writer-1", "write")).unwrap();
        registry.register_node(passport(reader, "reader-1", "read")).unwrap();

        let results = registry.find(&NodeQuery {
            capability: Some("write"),
            only_healthy: true,
            ..Default::default()
        });

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.uid, writer);
    }

    #[test]
    fn find_respects_fifo_registration_order() {
        let registry = Registry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        registry.register_node(passport(first, "writer-1", "write")).unwrap();
        std::thread::sleep(StdDuration::from_millis(2));
        registry.register_node(passport(second, "writer-2", "write")).unwrap();

        let results = registry.find(&NodeQuery {
            capability: Some("write"),
            only_healthy: true,
            ..Default::default()
        });

        assert_eq!(results[0].metadata.uid, first);
        assert_eq!(results[1].metadata.uid, second);
    }

    #[test]
    fn find_with_label_selector_requires_all_labels() {
        let registry = Registry::new();
        let uid = Uuid::new_v4();
        let mut p = passport(uid, "writer-1", "write");
        p.metadata.labels.insert("team".to_string(), "alpha".to_string());
        registry.register_node(p).unwrap();

        let mut selector = HashMap::new();
        selector.insert("team".to_string(), "alpha".to_string());
        let results = registry.find(&NodeQuery {
            selector: Some(&selector),
            only_healthy: true,
            ..Default::default()
        });
        assert_eq!(results.len(), 1);

        selector.insert("region".to_string(), "us".to_string());
        let results = registry.find(&NodeQuery {
            selector: Some(&selector),
            only_healthy: true,
            ..Default::default()
        });
        assert!(results.is_empty());
    }

    #[test]
    fn deregister_removes_entry_and_frees_name() {
        let registry = Registry::new();
        let uid = Uuid::new_v4();
        registry.register_node(passport(uid, "writer-1", "write")).unwrap();
        registry.deregister_node(uid, "shutdown").unwrap();

        assert!(registry.get(uid).is_none());
        registry.register_node(passport(Uuid::new_v4(), "writer-1", "write")).unwrap();
    }

    #[test]
    fn sweep_evicts_entries_past_ttl() {
        let registry = Registry::new();
        let uid = Uuid::new_v4();
        let mut p = passport(uid, "writer-1", "write");
        p.status.lease.renew_time = Utc::now() - chrono::Duration::seconds(200);
        registry.register_node(p).unwrap();
        // last_seen is set at registration time (now), so a zero ttl is already stale.
        let config = RegistryConfig {
            heartbeat_interval: StdDuration::from_millis(1),
            ttl: StdDuration::from_millis(0),
            cleanup_interval: StdDuration::from_secs(1),
        };

        let evicted = registry.sweep(&config);
        assert_eq!(evicted, vec![uid]);
        assert!(registry.get(uid).is_none());
    }
}
