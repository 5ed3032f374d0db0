//! Bus Routing Benchmarks
//!
//! Measures baseline performance of the in-memory bus's publish/subscribe path,
//! the adaptation of actor-mailbox throughput to topic-routed envelope delivery:
//! - Point-to-point publish/receive latency
//! - Sustained publish throughput
//! - Fan-out to multiple subscribers on one routing key
//! - Correlated request/reply round trip

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use mindbus::{CommandPayload, Envelope, InMemoryBus, MessageBus, Payload, ResultPayload, ResultStatus};

fn command_envelope() -> Envelope {
    Envelope::new(
        "bench-orchestrator",
        Payload::Command(CommandPayload {
            action: "echo".to_string(),
            params: serde_json::Map::new(),
            timeout_seconds: Some(5),
            requirements: serde_json::Map::new(),
            context: None,
        }),
    )
}

fn publish_receive(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("publish_receive", |b| {
        b.to_async(&rt).iter(|| async {
            let bus = InMemoryBus::new();
            let mut subscription = bus.subscribe("cmd.echo.*").await.unwrap();
            bus.publish("cmd.echo.any", command_envelope()).await.unwrap();
            let received = subscription.recv().await;
            black_box(received);
        });
    });
}

fn publish_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("publish_throughput", |b| {
        b.to_async(&rt).iter(|| async {
            let bus = InMemoryBus::new();
            let mut subscription = bus.subscribe("cmd.echo.*").await.unwrap();
            for _ in 0..100 {
                bus.publish("cmd.echo.any", command_envelope()).await.unwrap();
            }
            let mut count = 0;
            while count < 100 {
                if subscription.recv().await.is_some() {
                    count += 1;
                }
            }
            black_box(count);
        });
    });
}

fn fan_out_to_ten_subscribers(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("fan_out_to_ten_subscribers", |b| {
        b.to_async(&rt).iter(|| async {
            let bus = InMemoryBus::new();
            let mut subscriptions = Vec::with_capacity(10);
            for _ in 0..10 {
                subscriptions.push(bus.subscribe("evt.node.#").await.unwrap());
            }
            bus.publish(
                "evt.node.heartbeat",
                Envelope::new(
                    "bench-worker",
                    Payload::Event(mindbus::EventPayload {
                        event_type: "node.heartbeat".to_string(),
                        event_data: serde_json::Map::new(),
                        severity: mindbus::EventSeverity::Info,
                        tags: std::collections::HashMap::new(),
                    }),
                ),
            )
            .await
            .unwrap();
            for subscription in &mut subscriptions {
                let _ = subscription.recv().await;
            }
            black_box(subscriptions);
        });
    });
}

fn request_reply_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("request_reply_round_trip", |b| {
        b.to_async(&rt).iter(|| async {
            let bus = std::sync::Arc::new(InMemoryBus::new());
            let worker_bus = bus.clone();
            let mut subscription = bus.subscribe("cmd.echo.*").await.unwrap();

            let responder = tokio::spawn(async move {
                let received = subscription.recv().await.unwrap();
                let reply = Envelope::new(
                    "bench-worker",
                    Payload::Result(ResultPayload {
                        status: ResultStatus::Success,
                        output: serde_json::Map::new(),
                        execution_time_ms: 1,
                        metrics: None,
                    }),
                )
                .with_correlation_id(received.id);
                worker_bus.publish("bench-orchestrator.reply", reply).await.unwrap();
            });

            let result = bus
                .request("cmd.echo.any", command_envelope(), Duration::from_secs(1))
                .await
                .unwrap();
            responder.await.unwrap();
            black_box(result);
        });
    });
}

fn configure_criterion() -> Criterion {
    Criterion::default()
        .sample_size(30)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(2))
        .without_plots()
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets =
        publish_receive,
        publish_throughput,
        fan_out_to_ten_subscribers,
        request_reply_round_trip
}

criterion_main!(benches);
