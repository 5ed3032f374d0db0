//! `${var.path}` variable expansion (§4.3.1).
//!
//! A string that is *entirely* one placeholder yields the raw value it resolves to
//! (object, array, or scalar), not a stringified form. A string with embedded
//! placeholders produces an interpolated string. Unresolvable references are left
//! literal. Expansion recurses through object and array values.

use std::collections::HashMap;

use serde_json::Value;

/// Expand every `${...}` placeholder in `value` against `variables`.
pub fn expand(value: &Value, variables: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => expand_string(s, variables),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand(v, variables)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| expand(v, variables)).collect()),
        other => other.clone(),
    }
}

fn expand_string(s: &str, variables: &HashMap<String, Value>) -> Value {
    expand_string_with(s, variables, value_to_interpolated_string)
}

/// Same placeholder-finding and leave-literal-when-unresolved rules as
/// [`expand_string`], but with `stringify` controlling how a resolved value
/// gets embedded into a partial (non-whole) placeholder match. Lets a caller
/// reuse this expansion for a non-string output format, e.g. a quoted literal
/// an expression evaluator can parse, rather than the plain interpolated text
/// `expand_string` produces.
pub(crate) fn expand_string_with(
    s: &str,
    variables: &HashMap<String, Value>,
    stringify: impl Fn(&Value) -> String,
) -> Value {
    if let Some(path) = whole_placeholder(s) {
        return resolve_path(&path, variables).unwrap_or_else(|| Value::String(s.to_string()));
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated placeholder: leave the rest of the string as-is.
            result.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let path = &after[..end];
        match resolve_path(path, variables) {
            Some(value) => result.push_str(&stringify(&value)),
            None => {
                result.push_str("${");
                result.push_str(path);
                result.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Value::String(result)
}

/// If `s` is exactly one `${...}` placeholder with nothing else around it, return
/// its path; otherwise `None`.
fn whole_placeholder(s: &str) -> Option<String> {
    let trimmed = s.strip_prefix("${")?.strip_suffix('}')?;
    if trimmed.contains("${") {
        return None;
    }
    Some(trimmed.to_string())
}

fn resolve_path(path: &str, variables: &HashMap<String, Value>) -> Option<Value> {
    let mut segments = path.split('.');
    let root = segments.next()?;
    let mut current = variables.get(root)?.clone();
    for segment in segments {
        current = match current {
            Value::Object(ref map) => map.get(segment)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

fn value_to_interpolated_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> HashMap<String, Value> {
        let mut variables = HashMap::new();
        variables.insert("topic".to_string(), json!("rust"));
        variables.insert("draft".to_string(), json!({"text": "hello", "score": 9}));
        variables.insert(
            "items".to_string(),
            json!(["a", "b"]),
        );
        variables
    }

    #[test]
    fn whole_placeholder_yields_raw_value() {
        let result = expand(&json!("${draft}"), &vars());
        assert_eq!(result, json!({"text": "hello", "score": 9}));
    }

    #[test]
    fn nested_path_resolves_through_objects() {
        let result = expand(&json!("${draft.text}"), &vars());
        assert_eq!(result, json!("hello"));
    }

    #[test]
    fn embedded_placeholder_interpolates_as_string() {
        let result = expand(&json!("Topic: ${topic}!"), &vars());
        assert_eq!(result, json!("Topic: rust!"));
    }

    #[test]
    fn unresolvable_reference_is_left_literal() {
        let result = expand(&json!("${missing.path}"), &vars());
        assert_eq!(result, json!("${missing.path}"));
    }

    #[test]
    fn recurses_through_objects_and_arrays() {
        let input = json!({
            "a": "${topic}",
            "b": ["${topic}", "literal"],
        });
        let result = expand(&input, &vars());
        assert_eq!(result, json!({"a": "rust", "b": ["rust", "literal"]}));
    }

    #[test]
    fn array_whole_placeholder_yields_raw_array() {
        let result = expand(&json!("${items}"), &vars());
        assert_eq!(result, json!(["a", "b"]));
    }
}
