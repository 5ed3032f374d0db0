//! The step machine (§4.3): turns a [`ProcessCard`] into a completed
//! [`ProcessInstance`] by walking `current_step_id` through execute/condition/
//! complete/wait steps, dispatching `execute` actions through a [`Dispatcher`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::card::{OnFailure, ProcessCard, StepKind};
use crate::condition;
use crate::config::OrchestratorConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::OrchestratorError;
use crate::instance::{ProcessInstance, StepResult, StepStatus};
use crate::template;

/// Drives process instances through a card using a configured [`Dispatcher`].
pub struct Engine {
    dispatcher: Arc<dyn Dispatcher>,
    config: OrchestratorConfig,
}

impl Engine {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, config: OrchestratorConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Run `card` to completion (or failure), seeding `variables.input` from
    /// `input_params` (§4.3 step 1).
    pub async fn execute_process(
        &self,
        card: &ProcessCard,
        input_params: serde_json::Map<String, Value>,
    ) -> ProcessInstance {
        let mut instance = ProcessInstance::new(
            card.metadata.id.clone(),
            card.spec.variables.clone(),
            input_params,
            card.first_step_id().map(str::to_string),
        );

        let max_retries = card
            .spec
            .steps
            .iter()
            .filter_map(|s| match &s.kind {
                StepKind::Execute { retry: Some(r), .. } => Some(r.max_attempts),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let max_iterations =
            card.spec.steps.len() * (max_retries as usize + 1) * self.config.loop_safety_multiplier;

        let mut attempts: HashMap<String, u32> = HashMap::new();
        let mut iterations = 0usize;

        while let Some(step_id) = instance.current_step_id.clone() {
            iterations += 1;
            if iterations > max_iterations.max(1) {
                instance.fail(format!(
                    "step '{step_id}' exceeded loop safety bound ({max_iterations} iterations)"
                ));
                warn!(%step_id, max_iterations, "loop safety bound exceeded");
                break;
            }

            let Some(step) = card.step(&step_id).cloned() else {
                // Unreachable given ProcessCard::validate_references, guarded anyway.
                instance.fail(format!("step '{step_id}' not found in card"));
                break;
            };

            match step.kind {
                StepKind::Execute { .. } => {
                    if self.run_execute_step(&step, &mut instance, &mut attempts).await {
                        break;
                    }
                }
                StepKind::Condition { condition: expr, then, else_ } => {
                    self.run_condition_step(&step.id, &expr, then, else_, &mut instance);
                }
                StepKind::Complete { result } => {
                    self.run_complete_step(&step.id, result, &mut instance).await;
                    break;
                }
                StepKind::Wait { duration, next } => {
                    if let Err(e) = self.run_wait_step(&step.id, &duration, next, &mut instance).await {
                        instance.fail(e.to_string());
                        break;
                    }
                }
            }
        }

        instance
    }

    /// Runs one `execute` step, including its retry loop. Returns `true` if the
    /// process terminated (failed/escalated) and the outer loop should stop.
    async fn run_execute_step(
        &self,
        step: &crate::card::Step,
        instance: &mut ProcessInstance,
        attempts: &mut HashMap<String, u32>,
    ) -> bool {
        let StepKind::Execute {
            action,
            params,
            output,
            retry,
            timeout_seconds,
            next,
        } = &step.kind
        else {
            unreachable!("run_execute_step called with a non-execute step");
        };

        let resolved_params = template::expand(&Value::Object(params.clone()), &instance.variables);
        let Value::Object(resolved_params) = resolved_params else {
            unreachable!("expanding an object value always yields an object");
        };

        let timeout = timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_request_timeout);

        let started_at = Utc::now();
        let outcome = self
            .dispatcher
            .dispatch(action, resolved_params, timeout, instance.trace_id, &instance.id.to_string())
            .await
            .unwrap_or_else(|e| dispatch_error_to_outcome(&e));

        match outcome {
            DispatchOutcome::Success { output: result_output } => {
                if let Some(name) = output {
                    instance
                        .variables
                        .insert(name.clone(), Value::Object(result_output.clone()));
                }
                instance.record_step(StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Completed,
                    attempt: attempts.get(&step.id).copied().unwrap_or(0) + 1,
                    output: Some(Value::Object(result_output)),
                    error: None,
                    started_at,
                    completed_at: Utc::now(),
                });
                attempts.remove(&step.id);
                instance.current_step_id = next.clone();
                false
            }
            DispatchOutcome::Failure { code, message } => {
                let attempt = attempts.entry(step.id.clone()).or_insert(0);
                *attempt += 1;
                instance.record_step(StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Failed,
                    attempt: *attempt,
                    output: None,
                    error: Some(format!("{code}: {message}")),
                    started_at,
                    completed_at: Utc::now(),
                });

                match retry {
                    Some(policy) if *attempt < policy.max_attempts => {
                        info!(step = %step.id, attempt, "retrying after delay");
                        tokio::time::sleep(Duration::from_secs(policy.delay_seconds)).await;
                        false
                    }
                    Some(policy) => {
                        attempts.remove(&step.id);
                        match policy.on_failure {
                            OnFailure::Continue => {
                                instance.current_step_id = next.clone();
                                false
                            }
                            OnFailure::Escalate => {
                                instance.wait_for_human();
                                true
                            }
                            OnFailure::Abort => {
                                instance.fail(format!("step '{}' failed: {message}", step.id));
                                true
                            }
                        }
                    }
                    None => {
                        instance.fail(format!("step '{}' failed: {message}", step.id));
                        true
                    }
                }
            }
        }
    }

    fn run_condition_step(
        &self,
        step_id: &str,
        expr: &str,
        then: Option<String>,
        else_: Option<String>,
        instance: &mut ProcessInstance,
    ) {
        let started_at = Utc::now();
        match condition::evaluate(expr, &instance.variables) {
            Ok(result) => {
                instance.record_step(StepResult {
                    step_id: step_id.to_string(),
                    status: StepStatus::Completed,
                    attempt: 1,
                    output: Some(Value::Bool(result)),
                    error: None,
                    started_at,
                    completed_at: Utc::now(),
                });
                instance.current_step_id = if result { then } else { else_ };
            }
            Err(e) => {
                instance.record_step(StepResult {
                    step_id: step_id.to_string(),
                    status: StepStatus::Failed,
                    attempt: 1,
                    output: None,
                    error: Some(e.to_string()),
                    started_at,
                    completed_at: Utc::now(),
                });
                instance.fail(format!("condition step '{step_id}' failed: {e}"));
            }
        }
    }

    async fn run_complete_step(&self, step_id: &str, result: Option<Value>, instance: &mut ProcessInstance) {
        let expanded = result.map(|value| template::expand(&value, &instance.variables));
        if let Some(value) = &expanded {
            instance.variables.insert("_result".to_string(), value.clone());
            self.save_process_result(step_id, value, instance).await;
        }
        instance.complete(expanded);
    }

    /// Best-effort save of the completed process's result through the dispatched
    /// `save_artifact` capability, mirroring the automatic save the source
    /// orchestrator ran after a successful run. A missing or failing storage
    /// worker is logged, not fatal: the process already succeeded on its own
    /// terms by the time its result is persisted.
    async fn save_process_result(&self, step_id: &str, result: &Value, instance: &ProcessInstance) {
        let content = serde_json::to_vec(result).unwrap_or_default();
        let mut params = serde_json::Map::new();
        params.insert("artifact_type".to_string(), Value::String("process_result".to_string()));
        params.insert("trace_id".to_string(), Value::String(instance.trace_id.to_string()));
        params.insert("created_by".to_string(), Value::String("orchestrator".to_string()));
        params.insert("filename".to_string(), Value::String(format!("{}.json", instance.id)));
        params.insert("content_type".to_string(), Value::String("application/json".to_string()));
        params.insert("step_id".to_string(), Value::String(step_id.to_string()));
        params.insert("content_hex".to_string(), Value::String(hex::encode(content)));

        let outcome = self
            .dispatcher
            .dispatch(
                "save_artifact",
                params,
                self.config.default_request_timeout,
                instance.trace_id,
                &instance.id.to_string(),
            )
            .await;

        match outcome {
            Ok(DispatchOutcome::Success { .. }) => {}
            Ok(DispatchOutcome::Failure { code, message }) => {
                warn!(process_id = %instance.id, %code, %message, "save_artifact rejected the process result");
            }
            Err(e) => {
                warn!(process_id = %instance.id, error = %e, "no worker available to save the process result");
            }
        }
    }

    async fn run_wait_step(
        &self,
        step_id: &str,
        duration: &str,
        next: Option<String>,
        instance: &mut ProcessInstance,
    ) -> Result<(), OrchestratorError> {
        let requested = parse_duration(duration)?;
        let capped = requested.min(self.config.max_wait);
        let started_at = Utc::now();
        tokio::time::sleep(capped).await;
        instance.record_step(StepResult {
            step_id: step_id.to_string(),
            status: StepStatus::Completed,
            attempt: 1,
            output: None,
            error: None,
            started_at,
            completed_at: Utc::now(),
        });
        instance.current_step_id = next;
        Ok(())
    }
}

fn dispatch_error_to_outcome(error: &OrchestratorError) -> DispatchOutcome {
    let code = match error {
        OrchestratorError::Bus(mindbus::BusError::Timeout(_)) => mindbus::ErrorCode::DeadlineExceeded,
        OrchestratorError::NoWorkerAvailable(_) => mindbus::ErrorCode::Unavailable,
        _ => mindbus::ErrorCode::Internal,
    };
    DispatchOutcome::Failure {
        code,
        message: error.to_string(),
    }
}

/// Parse `<float>[s|m|h]` (§4.3 `wait` step).
fn parse_duration(spec: &str) -> Result<Duration, OrchestratorError> {
    let spec = spec.trim();
    let (number, unit) = spec.split_at(spec.len().saturating_sub(1));
    let multiplier = match unit {
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        _ => return Err(OrchestratorError::InvalidDuration(spec.to_string())),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| OrchestratorError::InvalidDuration(spec.to_string()))?;
    if value < 0.0 {
        return Err(OrchestratorError::InvalidDuration(spec.to_string()));
    }
    Ok(Duration::from_secs_f64(value * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_minutes_hours() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("0.5s").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_malformed_duration() {
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("abc").is_err());
    }
}
