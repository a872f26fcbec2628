//! The workload format: base64 (standard alphabet) over JSON
//! `{"params": …, "logPrefix": …, "callback": …}`.

use crate::error::job::JobError;
use crate::error::serde::SerdeError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

const PARAMS: &str = "params";
const LOG_PREFIX: &str = "logPrefix";
const CALLBACK: &str = "callback";

/// A follow-up function to submit once a job finishes, with extra positional arguments placed
/// between the status record and the return value.
///
/// On the wire this is either the bare function name or a sequence whose first element is the
/// function name.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Callback {
    pub function: String,
    pub args: Vec<Value>,
}

impl Callback {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }
}

impl TryFrom<Value> for Callback {
    type Error = JobError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(function) => Ok(Callback::new(function)),
            Value::Array(mut items) if !items.is_empty() => match items.remove(0) {
                Value::String(function) => Ok(Callback::with_args(function, items)),
                other => Err(JobError::InvalidCallback(format!(
                    "function name must be a string, got {other}"
                ))),
            },
            other => Err(JobError::InvalidCallback(other.to_string())),
        }
    }
}

impl From<Callback> for Value {
    fn from(callback: Callback) -> Self {
        if callback.args.is_empty() {
            return Value::String(callback.function);
        }
        let mut items = Vec::with_capacity(callback.args.len() + 1);
        items.push(Value::String(callback.function));
        items.extend(callback.args);
        Value::Array(items)
    }
}

/// The decoded body of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub params: Value,
    pub log_prefix: Value,
    pub callback: Option<Callback>,
}

impl Payload {
    pub fn encode(&self) -> Result<String, SerdeError> {
        encode_json(self)
    }

    /// Decode a workload. Besides the current form, accepts the legacy flat form where the
    /// top level is the parameter map itself (optionally carrying `logPrefix` / `callback`) or a
    /// positional parameter list.
    pub fn decode(workload: &str) -> Result<Self, JobError> {
        let bytes = STANDARD
            .decode(workload.trim())
            .map_err(SerdeError::from)?;
        let json = String::from_utf8(bytes).map_err(SerdeError::from)?;
        let value: Value = serde_json::from_str(&json).map_err(SerdeError::from)?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, JobError> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Ok(Payload {
                    params: other,
                    log_prefix: Value::Null,
                    callback: None,
                });
            }
        };

        let log_prefix = map.remove(LOG_PREFIX).unwrap_or(Value::Null);
        let callback = match map.remove(CALLBACK) {
            None | Some(Value::Null) => None,
            Some(callback) => Some(Callback::try_from(callback)?),
        };
        let params = match map.remove(PARAMS) {
            Some(params) => params,
            None => Value::Object(map),
        };

        Ok(Payload {
            params,
            log_prefix,
            callback,
        })
    }
}

/// Encode a task's return value for the queue server.
pub fn encode_return(value: &Value) -> Result<String, SerdeError> {
    encode_json(value)
}

/// Decode a value produced by [`encode_return`].
pub fn decode_return(encoded: &str) -> Result<Value, SerdeError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, SerdeError> {
    Ok(STANDARD.encode(serde_json::to_vec(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::{Map, json};

    fn encode_flat(map: Map<String, Value>) -> String {
        STANDARD.encode(Value::Object(map).to_string())
    }

    #[rstest]
    #[case(json!({"param1": "a", "param2": "b"}))]
    #[case(json!(["a", 2, {"nested": true}]))]
    #[case(json!(42))]
    #[case(json!("text"))]
    #[case(json!(null))]
    #[case(json!({"0": "positional", "name": "named"}))]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn params_survive_encoding(#[case] params: Value) {
        let payload = Payload {
            params,
            log_prefix: json!(["order", 17]),
            callback: Some(Callback::with_args("app.work.log", vec![json!("x")])),
        };

        let decoded = Payload::decode(&payload.encode().unwrap()).unwrap();

        assert_eq!(decoded, payload);
    }

    #[test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn encoded_shape() {
        let payload = Payload {
            params: json!({"a": 1}),
            log_prefix: Value::Null,
            callback: Some(Callback::new("app.work.log")),
        };

        let bytes = STANDARD.decode(payload.encode().unwrap()).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(
            value,
            json!({"params": {"a": 1}, "logPrefix": null, "callback": "app.work.log"})
        );
    }

    #[test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn legacy_flat_map() {
        let mut map = Map::new();
        map.insert("param1".to_string(), json!("a"));
        map.insert("logPrefix".to_string(), json!("legacy"));
        map.insert("callback".to_string(), json!(["app.work.log", 1]));

        let decoded = Payload::decode(&encode_flat(map)).unwrap();

        assert_eq!(decoded.params, json!({"param1": "a"}));
        assert_eq!(decoded.log_prefix, json!("legacy"));
        assert_eq!(
            decoded.callback,
            Some(Callback::with_args("app.work.log", vec![json!(1)]))
        );
    }

    #[test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn legacy_positional_list() {
        let workload = STANDARD.encode(r#"["a", "b"]"#);
        let decoded = Payload::decode(&workload).unwrap();
        assert_eq!(decoded.params, json!(["a", "b"]));
        assert_eq!(decoded.callback, None);
    }

    #[rstest]
    #[case("not base64!")]
    #[case("bm90IGpzb24=")]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn undecodable(#[case] workload: &str) {
        assert!(matches!(
            Payload::decode(workload),
            Err(JobError::Decode(_))
        ));
    }

    #[rstest]
    #[case(json!([]))]
    #[case(json!([1, "x"]))]
    #[case(json!({"function": "x"}))]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn invalid_callback(#[case] callback: Value) {
        let workload = STANDARD.encode(json!({"params": [], "callback": callback}).to_string());
        assert!(matches!(
            Payload::decode(&workload),
            Err(JobError::InvalidCallback(_))
        ));
    }

    #[test]
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn return_value() {
        let encoded = encode_return(&json!({"sum": 3})).unwrap();
        assert_eq!(decode_return(&encoded).unwrap(), json!({"sum": 3}));
    }
}
