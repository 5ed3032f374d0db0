//! Restricted boolean condition evaluation for `condition` steps (§4.3, §4.3.1).
//!
//! Variable substitution reuses [`template::expand_string_with`], the same
//! placeholder-finding and leave-literal-when-unresolved expander every other
//! templated field goes through, rather than a second substitution pass with
//! its own rules for a reference that doesn't resolve. The expanded expression
//! is then parsed and evaluated by `evalexpr` itself — a restricted grammar
//! with no function-call context registered, so a condition can never execute
//! arbitrary code, only arithmetic/comparison/boolean logic over its own literals.

use std::collections::HashMap;

use evalexpr::eval_boolean;
use serde_json::Value;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::template;

/// Expand `${var.path}` placeholders into `evalexpr` literals and evaluate the
/// resulting boolean expression.
pub fn evaluate(condition: &str, variables: &HashMap<String, Value>) -> OrchestratorResult<bool> {
    let expanded = template::expand_string_with(condition, variables, value_to_evalexpr_literal);
    let expression = match expanded {
        Value::String(s) => s,
        other => value_to_evalexpr_literal(&other),
    };
    eval_boolean(&expression)
        .map_err(|e| OrchestratorError::ConditionEvaluation(format!("{expression}: {e}")))
}

fn value_to_evalexpr_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "()".to_string(),
        other => format!("{:?}", other.to_string()),
    }
}
