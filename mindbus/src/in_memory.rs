//! In-process [`MessageBus`] implementation: no network, no broker process.
//!
//! Used for unit/integration tests and for dispatchers that run workers in the same
//! process as the orchestrator (§5 "in-process dispatch" mode).

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout as tokio_timeout;
use uuid::Uuid;

use crate::bus::{MessageBus, Subscription};
use crate::envelope::Envelope;
use crate::error::{BusError, BusResult};
use crate::topic;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 1024;

struct Subscriber {
    pattern: String,
    sender: mpsc::Sender<Envelope>,
}

/// A `tokio::mpsc`-backed [`Subscription`] handed back by [`InMemoryBus::subscribe`].
pub struct InMemorySubscription {
    receiver: mpsc::Receiver<Envelope>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

/// A bus that delivers envelopes to in-process subscribers by matching routing keys
/// against subscription patterns (§6 grammar), with no external broker involved.
#[derive(Default)]
pub struct InMemoryBus {
    subscribers: DashMap<u64, Subscriber>,
    pending_replies: DashMap<Uuid, oneshot::Sender<Envelope>>,
    next_subscriber_id: AtomicU64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn dispatch(&self, routing_key: &str, envelope: &Envelope) {
        for entry in self.subscribers.iter() {
            if topic::matches(&entry.pattern, routing_key) {
                // A full subscriber channel means a slow consumer; drop rather than
                // block the publisher, matching at-most-once in-process delivery.
                let _ = entry.sender.try_send(envelope.clone());
            }
        }

        if let Some(correlation_id) = envelope.correlation_id {
            if let Some((_, sender)) = self.pending_replies.remove(&correlation_id) {
                let _ = sender.send(envelope.clone());
            }
        }
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, routing_key: &str, envelope: Envelope) -> BusResult<()> {
        self.dispatch(routing_key, &envelope);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<Box<dyn Subscription>> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(
            id,
            Subscriber {
                pattern: pattern.to_string(),
                sender,
            },
        );
        Ok(Box::new(InMemorySubscription { receiver }))
    }

    async fn request(
        &self,
        routing_key: &str,
        command: Envelope,
        timeout: std::time::Duration,
    ) -> BusResult<Envelope> {
        let correlation_id = command.id;
        let (reply_sender, reply_receiver) = oneshot::channel();
        self.pending_replies.insert(correlation_id, reply_sender);

        self.dispatch(routing_key, &command);

        match tokio_timeout(timeout, reply_receiver).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => {
                self.pending_replies.remove(&correlation_id);
                Err(BusError::Closed)
            }
            Err(_) => {
                self.pending_replies.remove(&correlation_id);
                Err(BusError::Timeout(correlation_id))
            }
        }
    }
}
