//! Node Registry (§4.2): soft-state service discovery for the workers the
//! Orchestrator dispatches to.
//!
//! [`Registry`] is the in-memory directory, safe to clone and share across tasks.
//! [`sweeper::spawn_sweeper`] periodically demotes and evicts stale entries.
//! [`RegistryService`] is the production path: it drives the Registry entirely from
//! `evt.node.*` events on [`mindbus`], so in production nothing calls
//! [`Registry::register_node`] directly except the service itself.

pub mod config;
pub mod error;
pub mod passport;
pub mod registry;
pub mod service;
pub mod sweeper;

pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use passport::{
    Capability, Condition, Endpoint, Lease, NodeMetadata, NodePassport, NodePhase, NodeSpec,
    NodeStatus, NodeType,
};
pub use registry::{HealthState, NodeQuery, Registry, RegistryEntry, RegistryEvent};
pub use service::RegistryService;
pub use sweeper::spawn_sweeper;
