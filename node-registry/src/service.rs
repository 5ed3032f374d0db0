//! Registry Service (§4.2, component D): bridges node lifecycle events on the bus
//! into the [`Registry`]. The only writer of the Registry in production; direct
//! in-process registration (calling [`Registry::register_node`] directly) remains
//! available for tests and the in-process dispatcher.

use std::sync::Arc;

use mindbus::{EventPayload, MessageBus, Payload};
use tracing::{error, warn};
use uuid::Uuid;

use crate::passport::NodePassport;
use crate::registry::Registry;

const NODE_EVENTS_PATTERN: &str = "evt.node.#";

/// Drives a [`Registry`] from `evt.node.registered` / `evt.node.heartbeat` /
/// `evt.node.deregistered` events published on the bus.
pub struct RegistryService {
    bus: Arc<dyn MessageBus>,
    registry: Registry,
}

impl RegistryService {
    pub fn new(bus: Arc<dyn MessageBus>, registry: Registry) -> Self {
        Self { bus, registry }
    }

    /// Run the event loop until the subscription closes (bus shutdown).
    pub async fn run(self) -> mindbus::BusResult<()> {
        let mut subscription = self.bus.subscribe(NODE_EVENTS_PATTERN).await?;
        while let Some(envelope) = subscription.recv().await {
            let Payload::Event(event) = envelope.data else {
                continue;
            };
            self.handle_event(event);
        }
        Ok(())
    }

    fn handle_event(&self, event: EventPayload) {
        match event.event_type.as_str() {
            "node.registered" => self.handle_registered(event),
            "node.heartbeat" => self.handle_heartbeat(event),
            "node.deregistered" => self.handle_deregistered(event),
            other => warn!(event_type = other, "unhandled node event type"),
        }
    }

    fn handle_registered(&self, event: EventPayload) {
        let Some(passport_value) = event.event_data.get("passport") else {
            warn!("node.registered event missing passport field");
            return;
        };
        let passport: NodePassport = match serde_json::from_value(passport_value.clone()) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "failed to parse node passport");
                return;
            }
        };
        if let Err(e) = self.registry.register_node(passport) {
            warn!(error = %e, "registration rejected");
        }
    }

    fn handle_heartbeat(&self, event: EventPayload) {
        let Some(uid) = extract_uid(&event) else {
            warn!("node.heartbeat event missing uid field");
            return;
        };
        self.registry.update_heartbeat(uid);
    }

    fn handle_deregistered(&self, event: EventPayload) {
        let Some(uid) = extract_uid(&event) else {
            warn!("node.deregistered event missing uid field");
            return;
        };
        let reason = event
            .event_data
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("unspecified")
            .to_string();
        if let Err(e) = self.registry.deregister_node(uid, reason) {
            warn!(error = %e, "deregistration of unknown node");
        }
    }
}

fn extract_uid(event: &EventPayload) -> Option<Uuid> {
    event
        .event_data
        .get("uid")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}
