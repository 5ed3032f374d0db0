//! MindBus: the typed, topic-routed message plane every other crate in this workspace
//! talks over (§4.1).
//!
//! Three things make this more than "publish bytes to a queue":
//!
//! - [`envelope::Envelope`] carries CloudEvents-shaped routing metadata around a
//!   [`payload::Payload`], a tagged sum type with one variant per message kind
//!   (command/result/error/event/control) instead of an untyped dictionary.
//! - [`topic`] implements the AMQP topic-exchange routing-key grammar so in-process
//!   and AMQP subscribers match patterns identically.
//! - [`bus::MessageBus`] is the single trait every transport implements:
//!   [`in_memory::InMemoryBus`] for tests and in-process dispatch,
//!   [`amqp::AmqpBus`] (feature `amqp`) for the production broker.

pub mod bus;
pub mod codes;
pub mod config;
pub mod envelope;
pub mod error;
pub mod in_memory;
pub mod payload;
pub mod topic;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use bus::{MessageBus, Subscription};
pub use codes::ErrorCode;
pub use config::BusConfig;
pub use envelope::Envelope;
pub use error::{BusError, BusResult};
pub use in_memory::InMemoryBus;
pub use payload::{
    CommandPayload, ControlPayload, ErrorInfo, ErrorPayload, EventPayload, EventSeverity,
    EnvelopeType, Payload, ResultPayload, ResultStatus,
};

#[cfg(feature = "amqp")]
pub use amqp::AmqpBus;
