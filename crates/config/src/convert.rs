// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversion between plain YAML option values and the core value model.

use crate::error::ConfigError;
use indexmap::IndexMap;
use labx_core::Value;

/// Convert a plain YAML scalar/sequence/mapping into a `Value`.
///
/// Configuration option values are plain YAML; tagged nodes and non-string
/// mapping keys are rejected.
pub fn value_from_yaml(yaml: &serde_yaml::Value) -> Result<Value, ConfigError> {
    match yaml {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(ConfigError::Validation(format!("numeric option out of range: {}", n)))
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::Str(s.clone())),
        serde_yaml::Value::Sequence(items) => {
            let converted: Result<Vec<Value>, ConfigError> =
                items.iter().map(value_from_yaml).collect();
            Ok(Value::List(converted?))
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (key, value) in map {
                let key = key.as_str().ok_or_else(|| {
                    ConfigError::Validation("option mapping keys must be strings".to_string())
                })?;
                out.insert(key.to_string(), value_from_yaml(value)?);
            }
            Ok(Value::Map(out))
        }
        serde_yaml::Value::Tagged(tagged) => Err(ConfigError::Validation(format!(
            "tagged YAML value not allowed in options: {}",
            tagged.tag
        ))),
    }
}

/// Convert a `Value` back into YAML.
///
/// Plain variants map onto native YAML nodes; rich variants (complex, sets,
/// arrays, enums, bytes) keep their tagged serde representation.
pub fn value_to_yaml(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Int(i) => serde_yaml::Value::Number((*i).into()),
        Value::Float(f) => serde_yaml::Value::Number((*f).into()),
        Value::Str(s) => serde_yaml::Value::String(s.clone()),
        Value::List(items) => {
            serde_yaml::Value::Sequence(items.iter().map(value_to_yaml).collect())
        }
        Value::Map(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (key, value) in map {
                out.insert(serde_yaml::Value::String(key.clone()), value_to_yaml(value));
            }
            serde_yaml::Value::Mapping(out)
        }
        rich => serde_yaml::to_value(rich).unwrap_or(serde_yaml::Value::Null),
    }
}

#[cfg(test)]
#[path = "convert_tests.rs"]
mod tests;
