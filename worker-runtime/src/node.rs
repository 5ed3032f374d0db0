//! [`WorkerNode`]: the harness every capability provider runs inside. A
//! start/stop/command-handler/heartbeat lifecycle, implemented as two
//! cooperating tokio tasks rather than a thread and a callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use mindbus::{
    CommandPayload, Envelope, ErrorInfo, ErrorPayload, EventPayload, EventSeverity, MessageBus,
    Payload, ResultPayload, ResultStatus,
};
use node_registry::{
    Condition, Endpoint, Lease, NodeMetadata, NodePassport, NodePhase, NodeSpec, NodeStatus,
};
use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::provider::CapabilityProvider;

/// A running worker. `command_bus` carries the main consume/reply traffic;
/// `heartbeat_bus` is a distinct bus handle (distinct AMQP channel in
/// production) so a stalled heartbeat send can never contend with command
/// delivery on the same channel (§5: "Heartbeat thread vs. main consumer
/// thread must use separate broker channels — sharing one has been observed
/// to deadlock").
pub struct WorkerNode {
    uid: Uuid,
    config: WorkerConfig,
    provider: Arc<dyn CapabilityProvider>,
    command_bus: Arc<dyn MessageBus>,
    heartbeat_bus: Arc<dyn MessageBus>,
    requests_processed: AtomicU64,
}

/// Handle to a running [`WorkerNode`]: signal shutdown and await clean exit.
pub struct WorkerHandle {
    main: tokio::task::JoinHandle<()>,
    heartbeat: tokio::task::JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
    node: Arc<WorkerNode>,
}

impl WorkerNode {
    pub fn new(
        command_bus: Arc<dyn MessageBus>,
        heartbeat_bus: Arc<dyn MessageBus>,
        config: WorkerConfig,
        provider: Arc<dyn CapabilityProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uid: Uuid::new_v4(),
            config,
            provider,
            command_bus,
            heartbeat_bus,
            requests_processed: AtomicU64::new(0),
        })
    }

    pub fn uid(&self) -> Uuid {
        self.uid
    }

    fn build_passport(&self) -> NodePassport {
        let mut labels = self.config.labels.clone();
        for capability in self.provider.capabilities() {
            labels.insert(format!("capability.{}", capability.name), "true".to_string());
        }

        NodePassport {
            metadata: NodeMetadata {
                uid: self.uid,
                name: self.config.name.clone(),
                node_type: self.config.node_type,
                labels,
                version: self.config.version.clone(),
            },
            spec: NodeSpec {
                capabilities: self.provider.capabilities(),
                endpoint: Endpoint {
                    protocol: "amqp".to_string(),
                    queue: self.uid.to_string(),
                },
                configuration: serde_json::Map::new(),
            },
            status: NodeStatus {
                phase: NodePhase::Running,
                conditions: vec![Condition {
                    condition_type: "Ready".to_string(),
                    status: true,
                    reason: Some("WorkerStarted".to_string()),
                    last_transition: Utc::now(),
                }],
                lease: Lease {
                    holder_identity: self.uid,
                    lease_duration_seconds: self.config.lease_duration().as_secs(),
                    renew_time: Utc::now(),
                },
                current_tasks: 0,
                total_tasks_processed: self.requests_processed.load(Ordering::Relaxed),
            },
        }
    }

    async fn publish_event(
        &self,
        bus: &Arc<dyn MessageBus>,
        topic: &str,
        suffix: &str,
        event_type: &str,
        event_data: serde_json::Map<String, serde_json::Value>,
    ) -> mindbus::BusResult<()> {
        let envelope = Envelope::new(
            self.config.name.clone(),
            Payload::Event(EventPayload {
                event_type: event_type.to_string(),
                event_data,
                severity: EventSeverity::Info,
                tags: HashMap::new(),
            }),
        );
        bus.publish(&mindbus::topic::event_key(topic, suffix), envelope).await
    }

    async fn send_registration_event(&self) -> mindbus::BusResult<()> {
        let passport = self.build_passport();
        let mut data = serde_json::Map::new();
        data.insert("uid".to_string(), serde_json::Value::String(self.uid.to_string()));
        data.insert("name".to_string(), serde_json::Value::String(self.config.name.clone()));
        data.insert("passport".to_string(), serde_json::to_value(&passport).unwrap_or_default());
        self.publish_event(&self.command_bus, "node", "registered", "node.registered", data)
            .await?;
        info!(uid = %self.uid, name = %self.config.name, "registered with node registry");
        Ok(())
    }

    async fn send_heartbeat_event(&self) -> mindbus::BusResult<()> {
        let mut data = serde_json::Map::new();
        data.insert("uid".to_string(), serde_json::Value::String(self.uid.to_string()));
        data.insert("name".to_string(), serde_json::Value::String(self.config.name.clone()));
        data.insert(
            "total_tasks_processed".to_string(),
            serde_json::Value::from(self.requests_processed.load(Ordering::Relaxed)),
        );
        self.publish_event(&self.heartbeat_bus, "node", "heartbeat", "node.heartbeat", data)
            .await
    }

    async fn send_deregistration_event(&self, reason: &str) -> mindbus::BusResult<()> {
        let mut data = serde_json::Map::new();
        data.insert("uid".to_string(), serde_json::Value::String(self.uid.to_string()));
        data.insert("name".to_string(), serde_json::Value::String(self.config.name.clone()));
        data.insert("reason".to_string(), serde_json::Value::String(reason.to_string()));
        self.publish_event(&self.command_bus, "node", "deregistered", "node.deregistered", data)
            .await
    }

    /// Handle one inbound command envelope: run the provider, reply with
    /// `result` or `error` on `reply_to`.
    async fn handle_envelope(&self, envelope: Envelope) {
        let Payload::Command(CommandPayload { action, params, context, .. }) = envelope.data else {
            warn!("ignoring non-command envelope delivered to a command subscription");
            return;
        };
        let Some(reply_to) = envelope.reply_to.clone() else {
            warn!(action = %action, "command missing reply_to, dropping");
            return;
        };

        let started = Instant::now();
        let outcome = self.provider.handle_command(&action, params, context).await;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        let reply = match outcome {
            Ok(output) => {
                self.requests_processed.fetch_add(1, Ordering::Relaxed);
                Envelope::new(
                    self.config.name.clone(),
                    Payload::Result(ResultPayload {
                        status: ResultStatus::Success,
                        output,
                        execution_time_ms,
                        metrics: None,
                    }),
                )
            }
            Err(e) => {
                error!(action = %action, error = %e, "command handler failed");
                let mut info = ErrorInfo::new(e.code(), e.to_string());
                info.retryable = e.is_retryable();
                Envelope::new(
                    self.config.name.clone(),
                    Payload::Error(ErrorPayload {
                        error: info,
                        details: None,
                        execution_time_ms: Some(execution_time_ms),
                    }),
                )
            }
        }
        .with_correlation_id(envelope.id);
        let reply = match envelope.subject.clone() {
            Some(subject) => reply.with_subject(subject),
            None => reply,
        };

        if let Err(e) = self.command_bus.publish(&reply_to, reply).await {
            error!(%reply_to, error = %e, "failed to publish reply");
        }
    }

    /// Start the worker: register, begin heartbeating, and consume commands
    /// until [`WorkerHandle::shutdown`] is called.
    pub async fn run(self: Arc<Self>) -> Result<WorkerHandle, WorkerError> {
        self.send_registration_event().await?;

        let heartbeat_node = self.clone();
        let heartbeat = tokio::spawn(async move {
            let mut ticker = interval(heartbeat_node.config.heartbeat_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = heartbeat_node.send_heartbeat_event().await {
                    warn!(error = %e, "failed to send heartbeat");
                }
            }
        });

        let pattern = format!("cmd.*.{}", self.uid);
        let mut subscription = self.command_bus.subscribe(&pattern).await?;
        let consumer_node = self.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let main = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    envelope = subscription.recv() => {
                        let Some(envelope) = envelope else { break };
                        consumer_node.handle_envelope(envelope).await;
                    }
                }
            }
        });

        Ok(WorkerHandle {
            main,
            heartbeat,
            shutdown: shutdown_tx,
            node: self,
        })
    }
}

impl WorkerHandle {
    /// Stop consuming, stop heartbeating, announce deregistration.
    pub async fn shutdown(self, reason: &str) -> Result<(), WorkerError> {
        let _ = self.shutdown.send(());
        let _ = self.main.await;
        self.heartbeat.abort();
        self.node.send_deregistration_event(reason).await?;
        info!(uid = %self.node.uid, "worker deregistered and stopped");
        Ok(())
    }
}
