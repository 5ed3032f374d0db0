//! The message envelope: CloudEvents-shaped routing metadata around a [`Payload`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::{EnvelopeType, Payload};

/// Every message that crosses the bus, §3.1.
///
/// Serializes to JSON with CloudEvents-style attributes (`id`, `type`, `source`,
/// `subject`, `time`, `traceparent`) plus a `data` object holding the validated
/// [`Payload`] (§6 "Envelope serialization").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message id. Doubles as the AMQP `message_id` and, for commands
    /// without an explicit override, the `correlation_id`.
    pub id: Uuid,
    #[serde(rename = "type")]
    pub envelope_type: EnvelopeType,
    pub source: String,
    pub subject: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(rename = "traceparent")]
    pub trace_id: Option<String>,
    /// Mandatory on `result`/`error`; echoes the originating command's `id`.
    pub correlation_id: Option<Uuid>,
    /// Mandatory on a `command` that expects a reply; the queue name for the reply.
    pub reply_to: Option<String>,
    pub priority: u8,
    pub data: Payload,
}

impl Envelope {
    /// Build a new envelope with an auto-generated id, current timestamp, and the
    /// payload's type-appropriate default priority.
    pub fn new(source: impl Into<String>, data: Payload) -> Self {
        let priority = data.envelope_type().default_priority();
        Self {
            id: Uuid::new_v4(),
            envelope_type: data.envelope_type(),
            source: source.into(),
            subject: None,
            time: Utc::now(),
            trace_id: None,
            correlation_id: None,
            reply_to: None,
            priority,
            data,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Serialize this envelope as the AMQP message body (JSON).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an envelope from a raw message body, validating the payload shape
    /// implied by its own `type` field (§3.2 "validated on receive").
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}
