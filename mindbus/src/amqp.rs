//! AMQP 0-9-1 [`MessageBus`] implementation, the production transport named in §4.1.
//!
//! A single topic exchange (see [`crate::config::BusConfig::exchange_name`]) carries
//! every command/event/control envelope; each [`AmqpBus::subscribe`] call declares its
//! own exclusive queue bound to the requested pattern, so wildcard routing (§6) is
//! delegated entirely to the broker's own topic-exchange matching rather than
//! reimplemented client-side. Result/error envelopes skip the exchange and publish
//! directly to the queue named by `reply_to` on the default (nameless) exchange.
//!
//! A reply queue itself is long-lived: [`AmqpBus::request`] declares it durable once
//! and keeps a single consumer running for its whole lifetime, routing replies to
//! waiting callers by `correlation_id` (mirroring [`crate::in_memory::InMemoryBus`]'s
//! `pending_replies` table) rather than opening a fresh ephemeral queue per call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use crate::bus::{MessageBus, Subscription};
use crate::config::BusConfig;
use crate::envelope::Envelope;
use crate::error::{BusError, BusResult};
use crate::payload::EnvelopeType;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 1024;

/// AMQP `delivery_mode` value for persistent messages (§6 property mapping).
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// The default (nameless) exchange routes by queue name; used for publishing
/// result/error envelopes straight to the command's `reply_to` queue (§6).
const DEFAULT_EXCHANGE: &str = "";

/// The correlation-id routing table for one durable reply queue's consumer.
struct ReplyRouter {
    pending: DashMap<Uuid, oneshot::Sender<Envelope>>,
}

impl ReplyRouter {
    fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }
}

/// A bus backed by a single AMQP connection and a dedicated channel per subscription.
pub struct AmqpBus {
    connection: Connection,
    channel: Channel,
    exchange_name: String,
    reply_routers: Mutex<HashMap<String, Arc<ReplyRouter>>>,
}

impl AmqpBus {
    /// Connect to the broker described by `config` and declare its topic exchange.
    pub async fn connect(config: &BusConfig) -> BusResult<Self> {
        let uri = format!(
            "amqp://{}:{}@{}:{}/%2f",
            config.username, config.password, config.host, config.port
        );
        let options = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        let connection = Connection::connect(&uri, options)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        channel
            .exchange_declare(
                &config.exchange_name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        Ok(Self {
            connection,
            channel,
            exchange_name: config.exchange_name.clone(),
            reply_routers: Mutex::new(HashMap::new()),
        })
    }

    /// Whether the underlying connection reports itself connected.
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Get or create the long-lived consumer for the durable reply queue `queue_name`,
    /// declaring it and spawning its routing task on first use.
    async fn ensure_reply_router(&self, queue_name: &str) -> BusResult<Arc<ReplyRouter>> {
        let mut routers = self.reply_routers.lock().await;
        if let Some(router) = routers.get(queue_name) {
            return Ok(router.clone());
        }

        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let consumer_tag = format!("mindbus-reply-{}", Uuid::new_v4());
        let mut consumer = channel
            .basic_consume(
                queue_name,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let router = Arc::new(ReplyRouter::new());
        let routing_task_router = router.clone();

        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let Ok(delivery) = delivery else { continue };

                // §3.2: a payload that fails validation is NACKed without requeue.
                let parsed = std::str::from_utf8(&delivery.data)
                    .ok()
                    .and_then(|body| Envelope::from_json(body).ok());

                match parsed {
                    Some(envelope) => {
                        let _ = delivery.ack(BasicAckOptions::default()).await;
                        if let Some(correlation_id) = envelope.correlation_id {
                            if let Some((_, sender)) = routing_task_router.pending.remove(&correlation_id) {
                                let _ = sender.send(envelope);
                            }
                        }
                    }
                    None => {
                        let options = BasicNackOptions { requeue: false, ..Default::default() };
                        let _ = delivery.nack(options).await;
                    }
                }
            }
        });

        routers.insert(queue_name.to_string(), router.clone());
        Ok(router)
    }
}

/// A consumer-backed [`Subscription`]: a background task forwards broker deliveries
/// (acking each on receipt, §5 "at-least-once in-process, ack-on-dequeue on AMQP")
/// into a bounded channel the caller reads from.
pub struct AmqpSubscription {
    receiver: mpsc::Receiver<Envelope>,
    _stop: oneshot::Sender<()>,
}

#[async_trait]
impl Subscription for AmqpSubscription {
    async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

#[async_trait]
impl MessageBus for AmqpBus {
    async fn publish(&self, routing_key: &str, envelope: Envelope) -> BusResult<()> {
        let body = envelope.to_json().map_err(BusError::ValidationFailed)?;
        // §6: correlation_id = envelope.id on a command, copied through (the command's
        // id) on its reply — both cases collapse to "the originating command's id".
        let correlation_id = envelope.correlation_id.unwrap_or(envelope.id);
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
            .with_message_id(envelope.id.to_string().into())
            .with_correlation_id(correlation_id.to_string().into())
            .with_priority(envelope.priority);

        // §6/§4.1: results and errors go straight to the reply queue on the default
        // (nameless) exchange; commands/events/controls route through the topic
        // exchange by pattern.
        let exchange = match envelope.data.envelope_type() {
            EnvelopeType::Result | EnvelopeType::Error => DEFAULT_EXCHANGE,
            EnvelopeType::Command | EnvelopeType::Event | EnvelopeType::Control => {
                self.exchange_name.as_str()
            }
        };

        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body.as_bytes(),
                properties,
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<Box<dyn Subscription>> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        channel
            .queue_bind(
                queue.name().as_str(),
                &self.exchange_name,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let consumer_tag = format!("mindbus-{}", Uuid::new_v4());
        let mut consumer = channel
            .basic_consume(
                queue.name().as_str(),
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let channel = Arc::new(channel);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    delivery = consumer.next() => {
                        let Some(delivery) = delivery else { break };
                        let Ok(delivery) = delivery else { continue };

                        // §3.2: a payload that fails validation is NACKed without requeue,
                        // not silently dropped or left unacked.
                        let parsed = std::str::from_utf8(&delivery.data)
                            .ok()
                            .and_then(|body| Envelope::from_json(body).ok());

                        match parsed {
                            Some(envelope) => {
                                let _ = delivery.ack(BasicAckOptions::default()).await;
                                if sender.send(envelope).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                let options = BasicNackOptions { requeue: false, ..Default::default() };
                                let _ = delivery.nack(options).await;
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::new(AmqpSubscription {
            receiver,
            _stop: stop_tx,
        }))
    }

    async fn request(
        &self,
        routing_key: &str,
        command: Envelope,
        timeout: Duration,
    ) -> BusResult<Envelope> {
        let reply_to = command
            .reply_to
            .clone()
            .ok_or_else(|| BusError::Config("request() command must set reply_to".to_string()))?;
        let correlation_id = command.id;

        let router = self.ensure_reply_router(&reply_to).await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        router.pending.insert(correlation_id, reply_tx);

        if let Err(e) = self.publish(routing_key, command).await {
            router.pending.remove(&correlation_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => {
                router.pending.remove(&correlation_id);
                Err(BusError::Closed)
            }
            Err(_) => {
                router.pending.remove(&correlation_id);
                Err(BusError::Timeout(correlation_id))
            }
        }
    }
}
