use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mindbus::{CommandPayload, Envelope, InMemoryBus, MessageBus, Payload};
use node_registry::{Capability, NodeType};
use serde_json::Value;
use worker_runtime::{CapabilityProvider, WorkerConfig, WorkerNode, WorkerResult};

struct EchoProvider;

#[async_trait]
impl CapabilityProvider for EchoProvider {
    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability {
            name: "echo".to_string(),
            version: "1.0.0".to_string(),
            parameters: serde_json::Map::new(),
        }]
    }

    async fn handle_command(
        &self,
        action: &str,
        params: serde_json::Map<String, Value>,
        _context: Option<Value>,
    ) -> WorkerResult<serde_json::Map<String, Value>> {
        assert_eq!(action, "echo");
        Ok(params)
    }
}

/// End-to-end: register a worker over a real bus, publish a command the way
/// `BusDispatcher` does, assert the result comes back on the reply queue.
#[tokio::test]
async fn echo_command_round_trips_over_the_bus() {
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let config = WorkerConfig::new("echo-worker", NodeType::Agent)
        .with_heartbeat_interval(Duration::from_secs(60));
    let node = WorkerNode::new(bus.clone(), bus.clone(), config, Arc::new(EchoProvider));
    let uid = node.uid();
    let handle = node.run().await.expect("worker should start");

    // Give the subscription a moment to establish before publishing.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut params = serde_json::Map::new();
    params.insert("msg".to_string(), Value::String("hi".to_string()));

    let routing_key = mindbus::topic::command_key("echo", &uid.to_string());
    let command = Envelope::new(
        "test-orchestrator",
        Payload::Command(CommandPayload {
            action: "echo".to_string(),
            params: params.clone(),
            timeout_seconds: Some(5),
            requirements: serde_json::Map::new(),
            context: None,
        }),
    )
    .with_reply_to("test-orchestrator.reply");

    let reply = bus
        .request(&routing_key, command, Duration::from_secs(2))
        .await
        .expect("reply should arrive");

    match reply.data {
        Payload::Result(result) => assert_eq!(result.output, params),
        other => panic!("expected a result payload, got {other:?}"),
    }

    handle.shutdown("test complete").await.expect("shutdown should succeed");
}

/// A command for an unregistered action never reaches this worker, so an
/// orchestrator-side `request()` against it times out rather than hanging.
#[tokio::test]
async fn command_for_another_capability_is_ignored() {
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let config = WorkerConfig::new("echo-worker", NodeType::Agent)
        .with_heartbeat_interval(Duration::from_secs(60));
    let node = WorkerNode::new(bus.clone(), bus.clone(), config, Arc::new(EchoProvider));
    let handle = node.run().await.expect("worker should start");

    tokio::time::sleep(Duration::from_millis(20)).await;

    let command = Envelope::new(
        "test-orchestrator",
        Payload::Command(CommandPayload {
            action: "transcode".to_string(),
            params: serde_json::Map::new(),
            timeout_seconds: Some(1),
            requirements: serde_json::Map::new(),
            context: None,
        }),
    )
    .with_reply_to("test-orchestrator.reply");

    let result = bus
        .request("cmd.transcode.some-other-worker", command, Duration::from_millis(100))
        .await;
    assert!(result.is_err());

    handle.shutdown("test complete").await.expect("shutdown should succeed");
}
