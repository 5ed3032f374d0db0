//! The [`MessageBus`] trait: the one seam every transport (in-memory, AMQP) sits behind.

use async_trait::async_trait;
use std::time::Duration;

use crate::envelope::Envelope;
use crate::error::BusResult;

/// A handle to a subscription: an async stream of envelopes matching a routing pattern.
///
/// Implementations hand back a `tokio::sync::mpsc::Receiver`-backed stream rather than
/// a `Stream` object, keeping the trait object-safe for `Arc<dyn MessageBus>` callers.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next envelope, or `None` once the subscription is closed.
    async fn recv(&mut self) -> Option<Envelope>;
}

/// The bus abstraction described in §4.1: publish envelopes by routing key, subscribe
/// to a pattern, and perform correlation-based request/reply.
///
/// A concrete transport (in-process, AMQP) implements this once; every other crate in
/// the workspace only ever depends on `Arc<dyn MessageBus>`.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `envelope` under `routing_key`.
    async fn publish(&self, routing_key: &str, envelope: Envelope) -> BusResult<()>;

    /// Subscribe to every envelope whose routing key matches `pattern` (§6 grammar).
    async fn subscribe(&self, pattern: &str) -> BusResult<Box<dyn Subscription>>;

    /// Publish `command` and await a `result`/`error` envelope correlated to it,
    /// or [`crate::error::BusError::Timeout`] once `timeout` elapses.
    ///
    /// The caller is responsible for setting `command.reply_to` to a queue it is
    /// already subscribed on; this method does not create one implicitly, mirroring
    /// the reply-queue-per-instance topology chosen for this bus (one durable queue
    /// per requester, not one ephemeral queue per call).
    async fn request(
        &self,
        routing_key: &str,
        command: Envelope,
        timeout: Duration,
    ) -> BusResult<Envelope>;
}
