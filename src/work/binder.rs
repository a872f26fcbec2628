//! Binds a job's parameters to a task's declared parameters.

use crate::error::WorkhorseResult;
use crate::error::work::BindingError;
use crate::util::serde::value_to_log_string;
use crate::work::TaskDescriptor;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Arguments bound to a task's parameters, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    args: Vec<(String, Value)>,
}

impl BoundArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }

    /// Deserialize the argument bound to `name`.
    pub fn arg<T>(&self, name: &str) -> WorkhorseResult<T>
    where
        T: DeserializeOwned,
    {
        let value = self
            .get(name)
            .ok_or_else(|| BindingError::MissingParameter(name.to_string()))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.args.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.args.into_iter().map(|(_, value)| value).collect()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Resolve every declared parameter, in order, from: the named value, the positional value
/// (list index, or decimal key in a map), the declared default. `null` counts as absent.
pub fn bind(descriptor: &TaskDescriptor, params: &Value) -> Result<BoundArgs, BindingError> {
    let args = descriptor
        .params
        .iter()
        .enumerate()
        .map(|(position, param)| {
            if let Some(value) = lookup(params, &param.name, position) {
                if param.collection && !(value.is_array() || value.is_object()) {
                    return Err(BindingError::TypeMismatch {
                        name: param.name.clone(),
                        value: value_to_log_string(value),
                    });
                }
                return Ok((param.name.clone(), value.clone()));
            }
            param
                .default
                .clone()
                .map(|default| (param.name.clone(), default))
                .ok_or_else(|| BindingError::MissingParameter(param.name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BoundArgs { args })
}

fn lookup<'a>(params: &'a Value, name: &str, position: usize) -> Option<&'a Value> {
    let value = match params {
        Value::Object(map) => map
            .get(name)
            .filter(|value| !value.is_null())
            .or_else(|| map.get(&position.to_string())),
        Value::Array(list) => list.get(position),
        _ => None,
    };
    value.filter(|value| !value.is_null())
}

/// `Invoking billing::taskCharge($amount=10, $items=[...])`
pub fn invocation_line(work: &str, method: &str, args: &BoundArgs) -> String {
    let args = args
        .iter()
        .map(|(name, value)| {
            if value.is_array() || value.is_object() {
                format!("${name}=[...]")
            } else {
                format!("${name}={}", value_to_log_string(value))
            }
        })
        .join(", ");
    format!("Invoking {work}::{method}({args})")
}
