//! Process Instance: the ephemeral runtime object a [`crate::engine::Engine`] drives
//! through a [`crate::card::ProcessCard`] (§3.6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    WaitingHuman,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub attempt: u32,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: Uuid,
    pub card_id: String,
    pub input_params: serde_json::Map<String, Value>,
    pub variables: HashMap<String, Value>,
    pub status: ProcessStatus,
    pub current_step_id: Option<String>,
    pub step_results: Vec<StepResult>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub trace_id: Uuid,
}

impl ProcessInstance {
    /// Seed a new instance: card variables plus `input = input_params` (§4.3 step 1).
    pub fn new(
        card_id: impl Into<String>,
        initial_variables: HashMap<String, Value>,
        input_params: serde_json::Map<String, Value>,
        first_step_id: Option<String>,
    ) -> Self {
        let mut variables = initial_variables;
        variables.insert("input".to_string(), Value::Object(input_params.clone()));

        Self {
            id: Uuid::new_v4(),
            card_id: card_id.into(),
            input_params,
            variables,
            status: ProcessStatus::Running,
            current_step_id: first_step_id,
            step_results: Vec::new(),
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            trace_id: Uuid::new_v4(),
        }
    }

    pub fn record_step(&mut self, result: StepResult) {
        self.step_results.push(result);
    }

    pub fn complete(&mut self, result: Option<Value>) {
        self.status = ProcessStatus::Completed;
        self.result = result;
        self.completed_at = Some(Utc::now());
        self.current_step_id = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ProcessStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        self.current_step_id = None;
    }

    pub fn wait_for_human(&mut self) {
        self.status = ProcessStatus::WaitingHuman;
        self.completed_at = Some(Utc::now());
        self.current_step_id = None;
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }

    pub fn steps_completed(&self) -> usize {
        self.step_results
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .count()
    }
}
