//! Tagged payload values for plan arguments, observations and metadata.
//!
//! Open-ended maps never hold raw JSON: every leaf is a string, number or
//! boolean, and every branch is a list or a string-keyed map. JSON `null` has no
//! representation and is rejected at the conversion boundary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::signing::canonical_json_value;
use crate::error::RuntimeError;

/// String-keyed map of values. Ordered so serialization is stable.
pub type Payload = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(Payload),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Payload> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Text form used in identifiers: strings verbatim, everything else canonical.
    pub fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Nesting depth; scalars are depth 1.
    pub fn depth(&self) -> usize {
        match self {
            Value::Bool(_) | Value::Number(_) | Value::String(_) => 1,
            Value::List(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
            Value::Map(map) => 1 + payload_depth(map),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => payload_to_json(map),
        }
    }
}

/// Deepest nesting inside a payload (an empty payload is depth 0).
pub fn payload_depth(payload: &Payload) -> usize {
    payload.values().map(Value::depth).max().unwrap_or(0)
}

pub fn payload_to_json(payload: &Payload) -> serde_json::Value {
    serde_json::Value::Object(
        payload
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

/// Convert external JSON into a payload. The top level must be an object.
pub fn payload_from_json(json: serde_json::Value) -> Result<Payload, RuntimeError> {
    match Value::try_from(json)? {
        Value::Map(map) => Ok(map),
        other => Err(RuntimeError::InvalidPayload(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = RuntimeError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Err(RuntimeError::InvalidPayload(
                "null is not a valid payload value".to_string(),
            )),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => Ok(Value::Number(n)),
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Value::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| Value::try_from(value).map(|value| (key, value)))
                .collect::<Result<Payload, _>>()
                .map(Value::Map),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&canonical_json_value(&self.to_json()))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number((value as u64).into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no JSON form and fall back to their text.
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::List(value.into_iter().map(Value::String).collect())
    }
}

impl From<Payload> for Value {
    fn from(value: Payload) -> Self {
        Value::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_nested_json_objects() {
        let payload = payload_from_json(json!({
            "data": {"rows": [1, 2.5, "x"], "ok": true},
            "name": "sample"
        }))
        .expect("payload");

        let data = payload["data"].as_map().expect("map");
        assert_eq!(data["ok"], Value::Bool(true));
        assert_eq!(payload["name"].as_str(), Some("sample"));
        assert_eq!(payload_depth(&payload), 3);
    }

    #[test]
    fn rejects_null_anywhere() {
        let err = payload_from_json(json!({"a": {"b": null}})).expect_err("null rejected");
        assert!(err.to_string().contains("null"));
    }

    #[test]
    fn rejects_non_object_top_level() {
        let err = payload_from_json(json!([1, 2])).expect_err("array rejected");
        assert!(err.to_string().contains("expected a JSON object"));
    }

    #[test]
    fn deserializes_untagged_and_preserves_integers() {
        let value: Value = serde_json::from_str(r#"{"n": 1024, "f": 0.5, "s": "t"}"#).expect("parse");
        assert_eq!(value.to_string(), r#"{"f":0.5,"n":1024,"s":"t"}"#);
    }

    #[test]
    fn deserialize_rejects_null() {
        assert!(serde_json::from_str::<Value>("null").is_err());
    }

    #[test]
    fn to_text_keeps_strings_verbatim() {
        assert_eq!(Value::from("ingest").to_text(), "ingest");
        assert_eq!(Value::from(7i64).to_text(), "7");
    }
}
