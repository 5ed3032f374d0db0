//! Artifact persistence exposed as a dispatched capability rather than an
//! engine-level hook (see DESIGN.md). `artifact_storage`, `save_artifact`, and
//! `save_to_storage` all funnel into the same save-artifact call, and
//! `get_artifact` reads one back.

use async_trait::async_trait;
use node_registry::Capability;
use serde_json::Value;
use uuid::Uuid;

use artifact_store::{ArtifactStore, ArtifactStoreError, RegisterRequest, Visibility};

use crate::error::{WorkerError, WorkerResult};
use crate::provider::CapabilityProvider;

/// Wraps an [`ArtifactStore`] as a worker capability. A card step can dispatch
/// `save_artifact`/`artifact_storage` to persist a result and `get_artifact`
/// to read one back, the same way it would dispatch to any remote agent.
pub struct ArtifactStorageProvider {
    store: ArtifactStore,
}

impl ArtifactStorageProvider {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    async fn save_artifact(
        &self,
        mut params: serde_json::Map<String, Value>,
    ) -> WorkerResult<serde_json::Map<String, Value>> {
        let content_hex = params
            .remove("content_hex")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| WorkerError::InvalidArgument("missing content_hex".to_string()))?;
        let content = hex::decode(&content_hex)
            .map_err(|e| WorkerError::InvalidArgument(format!("content_hex is not valid hex: {e}")))?;

        let request = RegisterRequest {
            artifact_type: string_param(&params, "artifact_type")?,
            trace_id: uuid_param(&params, "trace_id")?,
            created_by: string_param(&params, "created_by")?,
            filename: string_param(&params, "filename")?,
            content_type: params
                .get("content_type")
                .and_then(|v| v.as_str())
                .unwrap_or("application/octet-stream")
                .to_string(),
            step_id: params.get("step_id").and_then(|v| v.as_str()).map(str::to_string),
            visibility: params
                .get("visibility")
                .and_then(|v| v.as_str())
                .map(parse_visibility)
                .transpose()?
                .unwrap_or_default(),
            context: params.get("context").cloned(),
        };

        let artifact = self
            .store
            .register_artifact(content, request)
            .await
            .map_err(to_worker_error)?;

        let mut output = serde_json::Map::new();
        output.insert("artifact_id".to_string(), Value::String(artifact.id.to_string()));
        output.insert("checksum".to_string(), Value::String(artifact.checksum));
        output.insert("uri".to_string(), Value::String(artifact.uri));
        output.insert(
            "status".to_string(),
            serde_json::to_value(artifact.status).unwrap_or(Value::Null),
        );
        Ok(output)
    }

    async fn get_artifact(
        &self,
        params: serde_json::Map<String, Value>,
    ) -> WorkerResult<serde_json::Map<String, Value>> {
        let artifact_id = uuid_param(&params, "artifact_id")?;
        let artifact = self.store.get_artifact(artifact_id).await.map_err(to_worker_error)?;
        let content = self
            .store
            .get_artifact_content(artifact_id)
            .await
            .map_err(to_worker_error)?;

        let mut output = serde_json::Map::new();
        output.insert("artifact_id".to_string(), Value::String(artifact.id.to_string()));
        output.insert("artifact_type".to_string(), Value::String(artifact.artifact_type));
        output.insert("content_type".to_string(), Value::String(artifact.content_type));
        output.insert("checksum".to_string(), Value::String(artifact.checksum));
        output.insert("content_hex".to_string(), Value::String(hex::encode(content)));
        Ok(output)
    }
}

#[async_trait]
impl CapabilityProvider for ArtifactStorageProvider {
    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability {
                name: "save_artifact".to_string(),
                version: "1.0.0".to_string(),
                parameters: serde_json::Map::new(),
            },
            Capability {
                name: "get_artifact".to_string(),
                version: "1.0.0".to_string(),
                parameters: serde_json::Map::new(),
            },
        ]
    }

    async fn handle_command(
        &self,
        action: &str,
        params: serde_json::Map<String, Value>,
        _context: Option<Value>,
    ) -> WorkerResult<serde_json::Map<String, Value>> {
        match action {
            "save_artifact" | "artifact_storage" | "save_to_storage" => self.save_artifact(params).await,
            "get_artifact" => self.get_artifact(params).await,
            other => Err(WorkerError::Unimplemented(format!("unsupported action: {other}"))),
        }
    }
}

fn string_param(params: &serde_json::Map<String, Value>, key: &str) -> WorkerResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| WorkerError::InvalidArgument(format!("missing {key}")))
}

fn uuid_param(params: &serde_json::Map<String, Value>, key: &str) -> WorkerResult<Uuid> {
    let raw = string_param(params, key)?;
    Uuid::parse_str(&raw).map_err(|e| WorkerError::InvalidArgument(format!("{key} is not a valid uuid: {e}")))
}

fn parse_visibility(raw: &str) -> WorkerResult<Visibility> {
    match raw {
        "private" => Ok(Visibility::Private),
        "trace" => Ok(Visibility::Trace),
        "public" => Ok(Visibility::Public),
        other => Err(WorkerError::InvalidArgument(format!("unknown visibility: {other}"))),
    }
}

fn to_worker_error(e: ArtifactStoreError) -> WorkerError {
    match e {
        ArtifactStoreError::NotFound(id) => WorkerError::NotFound(format!("artifact {id} not found")),
        ArtifactStoreError::InvalidManifest(msg) => WorkerError::InvalidArgument(msg),
        ArtifactStoreError::BlobMissing(id) => {
            WorkerError::Internal(format!("artifact {id} catalog row survived without its blob"))
        }
        other => WorkerError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_store::ArtifactStoreConfig;

    async fn provider() -> (ArtifactStorageProvider, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = ArtifactStoreConfig::builder().with_root(dir.path()).build();
        let store = ArtifactStore::open(config).await.unwrap();
        (ArtifactStorageProvider::new(store), dir)
    }

    #[tokio::test]
    async fn save_then_get_round_trips_content() {
        let (provider, _dir) = provider().await;

        let mut save_params = serde_json::Map::new();
        save_params.insert("artifact_type".to_string(), Value::String("process_result".to_string()));
        save_params.insert("trace_id".to_string(), Value::String(Uuid::new_v4().to_string()));
        save_params.insert("created_by".to_string(), Value::String("orchestrator".to_string()));
        save_params.insert("filename".to_string(), Value::String("result.json".to_string()));
        save_params.insert("content_hex".to_string(), Value::String(hex::encode(b"hello world")));

        let saved = provider.handle_command("save_artifact", save_params, None).await.unwrap();
        let artifact_id = saved["artifact_id"].as_str().unwrap().to_string();

        let mut get_params = serde_json::Map::new();
        get_params.insert("artifact_id".to_string(), Value::String(artifact_id));
        let fetched = provider.handle_command("get_artifact", get_params, None).await.unwrap();

        let content = hex::decode(fetched["content_hex"].as_str().unwrap()).unwrap();
        assert_eq!(content, b"hello world");
    }

    #[tokio::test]
    async fn unknown_action_is_unimplemented() {
        let (provider, _dir) = provider().await;
        let result = provider.handle_command("transcode", serde_json::Map::new(), None).await;
        assert!(matches!(result, Err(WorkerError::Unimplemented(_))));
    }

    #[tokio::test]
    async fn save_artifact_without_content_hex_is_rejected() {
        let (provider, _dir) = provider().await;
        let mut params = serde_json::Map::new();
        params.insert("artifact_type".to_string(), Value::String("process_result".to_string()));
        let result = provider.handle_command("save_artifact", params, None).await;
        assert!(matches!(result, Err(WorkerError::InvalidArgument(_))));
    }
}
