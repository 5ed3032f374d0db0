//! Payload shapes carried by an [`Envelope`](crate::envelope::Envelope).
//!
//! Per §9's re-architecture guidance, the five dynamic dictionary payloads of the
//! source are modelled here as a single tagged sum type rather than an untyped map.
//! "Schema validation" on send and receive becomes, in this shape, simply successful
//! `serde` deserialization into the variant that matches the envelope's declared
//! `EnvelopeType` — there is no separate schema document to keep in sync.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codes::ErrorCode;

/// The kind of message an [`Envelope`](crate::envelope::Envelope) carries.
///
/// Determines both the routing-key grammar used to publish the message (§6)
/// and which [`Payload`] variant is expected in `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    Command,
    Result,
    Error,
    Event,
    Control,
}

impl EnvelopeType {
    /// Default bus priority for this message kind, absent a more specific override.
    ///
    /// Command/result traffic is routine (20); control messages preempt everything.
    pub fn default_priority(self) -> u8 {
        match self {
            EnvelopeType::Control => 255,
            _ => 20,
        }
    }
}

/// The validated payload shape for one of the five envelope kinds.
///
/// `#[serde(tag = "type")]` is deliberately *not* used here: the discriminant lives
/// on the owning [`Envelope`](crate::envelope::Envelope) (`type` field), and the payload
/// itself is the untagged `data` object, matching the wire shape in §3.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Command(CommandPayload),
    Result(ResultPayload),
    Error(ErrorPayload),
    Event(EventPayload),
    Control(ControlPayload),
}

impl Payload {
    /// The [`EnvelopeType`] this payload corresponds to.
    pub fn envelope_type(&self) -> EnvelopeType {
        match self {
            Payload::Command(_) => EnvelopeType::Command,
            Payload::Result(_) => EnvelopeType::Result,
            Payload::Error(_) => EnvelopeType::Error,
            Payload::Event(_) => EnvelopeType::Event,
            Payload::Control(_) => EnvelopeType::Control,
        }
    }

    /// Parse a raw JSON value into the payload shape expected for `envelope_type`.
    ///
    /// This is the "validation" step of §3.2: a payload that does not match the
    /// shape required by its declared type fails here, and the caller (bus send
    /// path or receive path) must treat that as a schema-validation failure.
    pub fn from_value(envelope_type: EnvelopeType, value: Value) -> Result<Self, serde_json::Error> {
        match envelope_type {
            EnvelopeType::Command => Ok(Payload::Command(serde_json::from_value(value)?)),
            EnvelopeType::Result => Ok(Payload::Result(serde_json::from_value(value)?)),
            EnvelopeType::Error => Ok(Payload::Error(serde_json::from_value(value)?)),
            EnvelopeType::Event => Ok(Payload::Event(serde_json::from_value(value)?)),
            EnvelopeType::Control => Ok(Payload::Control(serde_json::from_value(value)?)),
        }
    }
}

/// `command` payload (§3.2): a request expecting a `result` or `error` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPayload {
    /// The capability being invoked; also the registry's discovery key.
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub requirements: serde_json::Map<String, Value>,
    pub context: Option<Value>,
}

/// `result` payload (§3.2): a successful reply to a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPayload {
    pub status: ResultStatus,
    #[serde(default)]
    pub output: serde_json::Map<String, Value>,
    pub execution_time_ms: u64,
    pub metrics: Option<Value>,
}

/// The (currently singular) success discriminant for a [`ResultPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Success,
}

/// `error` payload (§3.2): a failed reply to a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: ErrorInfo,
    pub details: Option<Value>,
    pub execution_time_ms: Option<u64>,
}

/// The structured body of an `error` payload's `error` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl ErrorInfo {
    /// Build an `ErrorInfo`, defaulting `retryable` to the code's own default.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            retryable: code.default_retryable(),
            code,
            message: message.into(),
        }
    }
}

/// `event` payload (§3.2): fire-and-forget, no correlation expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub event_type: String,
    #[serde(default)]
    pub event_data: serde_json::Map<String, Value>,
    pub severity: EventSeverity,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// Event severity levels used to filter and prioritize `event` traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// `control` payload (§3.2): an operator directive, always highest priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPayload {
    pub control_type: String,
    pub reason: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
}
