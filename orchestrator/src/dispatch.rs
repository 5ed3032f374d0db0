//! Dispatch layer (§4.3.2): two interchangeable ways to turn `execute_step` into
//! worker execution. The step machine in [`crate::engine`] only ever talks to the
//! [`Dispatcher`] trait and must not observe which implementation backs it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use mindbus::{CommandPayload, Envelope, MessageBus, Payload};
use node_registry::{NodeQuery, Registry};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{OrchestratorError, OrchestratorResult};

/// The outcome of dispatching one `execute` step, already unwrapped from the
/// envelope that carried it.
#[derive(Clone, Debug)]
pub enum DispatchOutcome {
    Success {
        output: serde_json::Map<String, Value>,
    },
    Failure {
        code: mindbus::ErrorCode,
        message: String,
    },
}

/// An in-process handler registered under a capability name (§4.3.2, "in-process
/// dispatch"): synchronous, no envelope round-trip.
pub type LocalHandler =
    Arc<dyn Fn(serde_json::Map<String, Value>) -> OrchestratorResult<DispatchOutcome> + Send + Sync>;

/// Turns a resolved `action` + `params` into an executed command, by whatever
/// transport the concrete implementation uses.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        action: &str,
        params: serde_json::Map<String, Value>,
        timeout: Duration,
        trace_id: Uuid,
        subject: &str,
    ) -> OrchestratorResult<DispatchOutcome>;
}

/// Production dispatch: resolve a worker via the Registry, publish a `command`
/// envelope, and correlate the reply on this orchestrator's durable reply queue.
pub struct BusDispatcher {
    bus: Arc<dyn MessageBus>,
    registry: Registry,
    reply_to: String,
}

impl BusDispatcher {
    pub fn new(bus: Arc<dyn MessageBus>, registry: Registry, reply_to: impl Into<String>) -> Self {
        Self {
            bus,
            registry,
            reply_to: reply_to.into(),
        }
    }
}

#[async_trait]
impl Dispatcher for BusDispatcher {
    async fn dispatch(
        &self,
        action: &str,
        params: serde_json::Map<String, Value>,
        timeout: Duration,
        trace_id: Uuid,
        subject: &str,
    ) -> OrchestratorResult<DispatchOutcome> {
        let candidates = self.registry.find(&NodeQuery {
            capability: Some(action),
            only_healthy: true,
            ..Default::default()
        });
        let worker = candidates
            .into_iter()
            .next()
            .ok_or_else(|| OrchestratorError::NoWorkerAvailable(action.to_string()))?;

        let routing_key = mindbus::topic::command_key(action, &worker.metadata.uid.to_string());
        let command = Envelope::new(
            "orchestrator",
            Payload::Command(CommandPayload {
                action: action.to_string(),
                params,
                timeout_seconds: Some(timeout.as_secs()),
                requirements: serde_json::Map::new(),
                context: None,
            }),
        )
        .with_subject(subject)
        .with_trace_id(trace_id.to_string())
        .with_reply_to(self.reply_to.clone());

        let reply = self.bus.request(&routing_key, command, timeout).await?;
        Ok(outcome_from_reply(reply))
    }
}

fn outcome_from_reply(reply: Envelope) -> DispatchOutcome {
    match reply.data {
        Payload::Result(result) => DispatchOutcome::Success {
            output: result.output,
        },
        Payload::Error(error) => DispatchOutcome::Failure {
            code: error.error.code,
            message: error.error.message,
        },
        other => DispatchOutcome::Failure {
            code: mindbus::ErrorCode::Internal,
            message: format!("unexpected reply payload shape: {other:?}"),
        },
    }
}

/// Test/in-process dispatch: a `capability -> handler` table, called synchronously
/// (§4.3.2). Used by the Orchestrator's own test suite and by callers that host
/// worker logic in the same process (e.g. the Artifact Store's `save_artifact`
/// capability, registered as a local service the same way the source system did).
#[derive(Clone, Default)]
pub struct InProcessDispatcher {
    handlers: Arc<DashMap<String, LocalHandler>>,
}

impl InProcessDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, action: impl Into<String>, handler: LocalHandler) {
        self.handlers.insert(action.into(), handler);
    }
}

#[async_trait]
impl Dispatcher for InProcessDispatcher {
    async fn dispatch(
        &self,
        action: &str,
        params: serde_json::Map<String, Value>,
        _timeout: Duration,
        _trace_id: Uuid,
        _subject: &str,
    ) -> OrchestratorResult<DispatchOutcome> {
        let handler = self
            .handlers
            .get(action)
            .ok_or_else(|| OrchestratorError::NoWorkerAvailable(action.to_string()))?
            .clone();
        handler(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_process_dispatcher_calls_registered_handler() {
        let dispatcher = InProcessDispatcher::new();
        dispatcher.register(
            "echo",
            Arc::new(|params| {
                Ok(DispatchOutcome::Success { output: params })
            }),
        );

        let mut params = serde_json::Map::new();
        params.insert("msg".to_string(), Value::String("hi".to_string()));

        let outcome = dispatcher
            .dispatch("echo", params.clone(), Duration::from_secs(1), Uuid::new_v4(), "s")
            .await
            .unwrap();

        match outcome {
            DispatchOutcome::Success { output } => assert_eq!(output, params),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn in_process_dispatcher_errors_on_unknown_action() {
        let dispatcher = InProcessDispatcher::new();
        let result = dispatcher
            .dispatch("nope", serde_json::Map::new(), Duration::from_secs(1), Uuid::new_v4(), "s")
            .await;
        assert!(matches!(result, Err(OrchestratorError::NoWorkerAvailable(_))));
    }
}
