//! Deterministic stand-ins for tool execution.
//!
//! No tool touches the outside world: each returns a fixed, argument-derived
//! result so cycles stay reproducible.

use crate::core::value::{Payload, Value};

/// Result of running `tool` with `args` under the stand-in implementation.
pub fn deterministic_output(tool: &str, args: &Payload) -> Value {
    let mut out = Payload::new();
    match tool {
        "validate_json" => {
            let fields = args
                .get("data")
                .and_then(Value::as_map)
                .map_or(0, |data| data.len());
            out.insert("valid".to_string(), Value::Bool(true));
            out.insert("message".to_string(), Value::from("Validation passed"));
            out.insert("fields".to_string(), Value::from(fields));
        }
        "analyze_data" => {
            out.insert("analyzed".to_string(), Value::Bool(true));
            out.insert(
                "insights".to_string(),
                Value::from(vec!["Data is well-formed".to_string()]),
            );
        }
        "read_file" => {
            out.insert("content".to_string(), Value::from("File contents here"));
            out.insert("size".to_string(), Value::from(1024u64));
        }
        _ => {
            out.insert("executed".to_string(), Value::Bool(true));
            out.insert("tool".to_string(), Value::from(tool));
            out.insert("args".to_string(), Value::Map(args.clone()));
        }
    }
    Value::Map(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::payload;
    use serde_json::json;

    #[test]
    fn validate_json_counts_fields() {
        let args = payload(json!({"data": {"a": 1, "b": 2}}));
        let out = deterministic_output("validate_json", &args);
        assert_eq!(out.to_string(), r#"{"fields":2,"message":"Validation passed","valid":true}"#);
    }

    #[test]
    fn unknown_tools_echo_their_arguments() {
        let args = payload(json!({"path": "/tmp/x"}));
        let out = deterministic_output("write_file", &args);
        let map = out.as_map().expect("map");
        assert_eq!(map["tool"], Value::from("write_file"));
        assert_eq!(map["args"], Value::Map(args));
    }

    #[test]
    fn outputs_are_stable() {
        let args = Payload::new();
        assert_eq!(
            deterministic_output("read_file", &args),
            deterministic_output("read_file", &args)
        );
    }
}
