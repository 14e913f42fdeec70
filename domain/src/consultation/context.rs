//! Structured request context
//!
//! An opaque key/value payload supplied with the request (patient age,
//! diagnoses, current medication, labs ...). The core never interprets the
//! keys; it only projects them into expert tasks and prompts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Immutable key/value context attached to a consultation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestContext(Map<String, Value>);

impl RequestContext {
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// Build a context from a JSON value; non-object values yield an error
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(format!("request context must be a JSON object, got {}", other)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Read-only projection merged with extra detail.
    ///
    /// Keys from `extra` win over keys of the original context; the
    /// original context itself is left untouched.
    pub fn project_with(&self, extra: &Map<String, Value>) -> Map<String, Value> {
        let mut projected = self.0.clone();
        for (k, v) in extra {
            projected.insert(k.clone(), v.clone());
        }
        projected
    }

    /// Human-readable `key: value` lines for prompts and notes
    pub fn describe(&self) -> String {
        describe_map(&self.0)
    }
}

/// Render a JSON map as `key: value` lines, one per entry
pub fn describe_map(map: &Map<String, Value>) -> String {
    if map.is_empty() {
        return "(none provided)".to_string();
    }
    map.iter()
        .map(|(k, v)| format!("- {}: {}", k.replace('_', " "), describe_value(v)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(describe_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}
