//! Exercises [`BusDispatcher`] over [`InMemoryBus`], wiring the reply route
//! through the same durable-per-instance reply queue name production code
//! builds via [`OrchestratorConfig::reply_queue`] rather than an ad hoc string.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mindbus::{Envelope, InMemoryBus, MessageBus, Payload, ResultPayload, ResultStatus};
use node_registry::{
    Capability, Endpoint, Lease, NodeMetadata, NodePassport, NodePhase, NodeSpec, NodeStatus, NodeType, Registry,
};
use orchestrator::{BusDispatcher, DispatchOutcome, Dispatcher, OrchestratorConfig};
use uuid::Uuid;

fn worker_passport(uid: Uuid, capability: &str) -> NodePassport {
    let now = Utc::now();
    NodePassport {
        metadata: NodeMetadata {
            uid,
            name: format!("worker-{uid}"),
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

#[tokio::test]
async fn bus_dispatcher_round_trips_through_the_configured_reply_queue() {
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let registry = Registry::new();
    let worker_uid = Uuid::new_v4();
    registry.register_node(worker_passport(worker_uid, "echo")).unwrap();

    let config = OrchestratorConfig::builder()
        .with_instance_id("bus-dispatch-test")
        .build()
        .unwrap();
    let reply_queue = config.reply_queue();
    let dispatcher = BusDispatcher::new(bus.clone(), registry, reply_queue.clone());

    let routing_key = mindbus::topic::command_key("echo", &worker_uid.to_string());
    let mut command_subscription = bus.subscribe(&routing_key).await.unwrap();
    let worker_bus = bus.clone();
    let expected_reply_queue = reply_queue.clone();
    let responder = tokio::spawn(async move {
        let command = command_subscription.recv().await.expect("command never arrived");
        let Payload::Command(payload) = command.data else {
            panic!("expected a command payload");
        };
        assert_eq!(command.reply_to.as_deref(), Some(expected_reply_queue.as_str()));

        let reply = Envelope::new(
            "worker",
            Payload::Result(ResultPayload {
                status: ResultStatus::Success,
                output: payload.params,
                execution_time_ms: 1,
                metrics: None,
            }),
        )
        .with_correlation_id(command.id);
        worker_bus
            .publish(&expected_reply_queue, reply)
            .await
            .expect("reply publish failed");
    });

    let mut params = serde_json::Map::new();
    params.insert("msg".to_string(), serde_json::Value::String("hi".to_string()));

    let outcome = dispatcher
        .dispatch("echo", params.clone(), Duration::from_secs(1), Uuid::new_v4(), "test-subject")
        .await
        .unwrap();

    responder.await.unwrap();

    match outcome {
        DispatchOutcome::Success { output } => assert_eq!(output, params),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn bus_dispatcher_errors_when_no_worker_offers_the_capability() {
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let registry = Registry::new();
    let config = OrchestratorConfig::builder()
        .with_instance_id("bus-dispatch-empty")
        .build()
        .unwrap();
    let dispatcher = BusDispatcher::new(bus, registry, config.reply_queue());

    let result = dispatcher
        .dispatch("echo", serde_json::Map::new(), Duration::from_secs(1), Uuid::new_v4(), "test-subject")
        .await;

    assert!(matches!(result, Err(orchestrator::OrchestratorError::NoWorkerAvailable(_))));
}
