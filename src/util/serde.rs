use serde_json::Value;

/// Function to default a boolean field to `true`.
pub const fn default_true() -> bool {
    true
}

/// Render a JSON value the way an operator expects to read it in a log line: strings without
/// quotes, everything else as compact JSON.
pub fn value_to_log_string(value: &Value) -> String {
    match value {
        Value::String(inner) => inner.clone(),
        other => other.to_string(),
    }
}
