//! End-to-end coverage of the in-process bus: publish/subscribe fan-out and
//! correlation-based request/reply across independent tasks.

use std::sync::Arc;
use std::time::Duration;

use mindbus::{CommandPayload, Envelope, ErrorCode, ErrorInfo, ErrorPayload, InMemoryBus, MessageBus, Payload};

fn echo_command(action: &str) -> Envelope {
    Envelope::new(
        "orchestrator",
        Payload::Command(CommandPayload {
            action: action.to_string(),
            params: serde_json::Map::new(),
            timeout_seconds: Some(5),
            requirements: serde_json::Map::new(),
            context: None,
        }),
    )
}

#[tokio::test]
async fn event_subscribers_see_only_their_topic() {
    let bus = InMemoryBus::new();
    let mut node_events = bus.subscribe("evt.node.#").await.unwrap();
    let mut artifact_events = bus.subscribe("evt.artifact.#").await.unwrap();

    let registered = Envelope::new(
        "node-registry",
        Payload::Event(mindbus::EventPayload {
            event_type: "node.registered".to_string(),
            event_data: serde_json::Map::new(),
            severity: mindbus::EventSeverity::Info,
            tags: Default::default(),
        }),
    );
    bus.publish("evt.node.registered", registered).await.unwrap();

    assert!(node_events.recv().await.is_some());
    assert!(
        tokio::time::timeout(Duration::from_millis(20), artifact_events.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn worker_replies_with_error_and_orchestrator_sees_it() {
    let bus = Arc::new(InMemoryBus::new());
    let worker_bus = bus.clone();

    let mut inbox = bus.subscribe("cmd.writer.any").await.unwrap();
    tokio::spawn(async move {
        let command = inbox.recv().await.unwrap();
        let reply = Envelope::new(
            "writer-1",
            Payload::Error(ErrorPayload {
                error: ErrorInfo::new(ErrorCode::FailedPrecondition, "missing dependency"),
                details: None,
                execution_time_ms: Some(3),
            }),
        )
        .with_correlation_id(command.id);
        worker_bus
            .publish("orchestrator.reply.inst-1", reply)
            .await
            .unwrap();
    });

    let result = bus
        .request("cmd.writer.any", echo_command("draft"), Duration::from_secs(1))
        .await
        .unwrap();

    match result.data {
        Payload::Error(err) => {
            assert_eq!(err.error.code, ErrorCode::FailedPrecondition);
            assert!(!err.error.retryable);
        }
        other => panic!("expected error payload, got {other:?}"),
    }
}

#[tokio::test]
async fn two_concurrent_requests_resolve_to_their_own_replies() {
    let bus = Arc::new(InMemoryBus::new());
    let worker_bus = bus.clone();

    let mut inbox = bus.subscribe("cmd.writer.any").await.unwrap();
    tokio::spawn(async move {
        for _ in 0..2 {
            let command = inbox.recv().await.unwrap();
            let reply = Envelope::new(
                "writer-1",
                Payload::Result(mindbus::ResultPayload {
                    status: mindbus::ResultStatus::Success,
                    output: serde_json::Map::new(),
                    execution_time_ms: 1,
                    metrics: None,
                }),
            )
            .with_correlation_id(command.id);
            worker_bus
                .publish("orchestrator.reply.inst-1", reply)
                .await
                .unwrap();
        }
    });

    let (first, second) = tokio::join!(
        bus.request("cmd.writer.any", echo_command("draft"), Duration::from_secs(1)),
        bus.request("cmd.writer.any", echo_command("review"), Duration::from_secs(1)),
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_ne!(first.unwrap().correlation_id, second.unwrap().correlation_id);
}
