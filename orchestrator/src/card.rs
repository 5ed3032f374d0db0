//! Process Card: the declarative plan a [`crate::engine::Engine`] interprets (§3.4).
//!
//! Loaded from YAML, validated once at load time so a malformed card never runs
//! (§3.4 invariant: "a card rejected at load time never runs").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OrchestratorError, OrchestratorResult};

/// On-failure policy once a step's retry budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    Abort,
    Continue,
    Escalate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_seconds: u64,
    #[serde(default = "default_on_failure")]
    pub on_failure: OnFailure,
}

fn default_on_failure() -> OnFailure {
    OnFailure::Abort
}

/// One step of a [`ProcessCard`], discriminated by `type` in the YAML source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Execute {
        action: String,
        #[serde(default)]
        params: serde_json::Map<String, Value>,
        output: Option<String>,
        retry: Option<RetryPolicy>,
        timeout_seconds: Option<u64>,
        next: Option<String>,
    },
    Condition {
        condition: String,
        then: Option<String>,
        #[serde(rename = "else")]
        else_: Option<String>,
    },
    Complete {
        result: Option<Value>,
    },
    Wait {
        duration: String,
        next: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(flatten)]
    pub kind: StepKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCardMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCardSpec {
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCard {
    pub metadata: ProcessCardMetadata,
    pub spec: ProcessCardSpec,
}

impl ProcessCard {
    /// Parse and validate a card from YAML text. See [`ProcessCard::validate_references`].
    pub fn from_yaml(yaml: &str) -> OrchestratorResult<Self> {
        let card: ProcessCard = serde_yaml::from_str(yaml)
            .map_err(|e| OrchestratorError::InvalidCard(e.to_string()))?;
        card.validate_references()?;
        Ok(card)
    }

    pub fn first_step_id(&self) -> Option<&str> {
        self.spec.steps.first().map(|s| s.id.as_str())
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.spec.steps.iter().find(|s| s.id == id)
    }

    /// Every `next`/`then`/`else` must refer to an existing step id (§3.4 invariant).
    pub fn validate_references(&self) -> OrchestratorResult<()> {
        let ids: std::collections::HashSet<&str> =
            self.spec.steps.iter().map(|s| s.id.as_str()).collect();

        if ids.len() != self.spec.steps.len() {
            return Err(OrchestratorError::InvalidCard(
                "duplicate step id".to_string(),
            ));
        }

        for step in &self.spec.steps {
            let refs: Vec<&str> = match &step.kind {
                StepKind::Execute { next, .. } => next.as_deref().into_iter().collect(),
                StepKind::Condition { then, else_, .. } => {
                    then.as_deref().into_iter().chain(else_.as_deref()).collect()
                }
                StepKind::Wait { next, .. } => next.as_deref().into_iter().collect(),
                StepKind::Complete { .. } => Vec::new(),
            };
            for target in refs {
                if !ids.contains(target) {
                    return Err(OrchestratorError::InvalidCard(format!(
                        "step '{}' refers to unknown step id '{target}'",
                        step.id
                    )));
                }
            }
        }
        Ok(())
    }
}
