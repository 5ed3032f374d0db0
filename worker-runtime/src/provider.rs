//! The single-method business-logic seam every worker implements (§9
//! "Reflection-based handler lookup becomes an interface with a single
//! `execute(action, params, context)` method plus an out-of-band manifest of
//! supported actions").

use async_trait::async_trait;
use node_registry::Capability;
use serde_json::Value;

use crate::error::WorkerResult;

#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// The out-of-band manifest: what this worker advertises in its passport
    /// and what the Orchestrator resolves workers by.
    fn capabilities(&self) -> Vec<Capability>;

    async fn handle_command(
        &self,
        action: &str,
        params: serde_json::Map<String, Value>,
        context: Option<Value>,
    ) -> WorkerResult<serde_json::Map<String, Value>>;
}
