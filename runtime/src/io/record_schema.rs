//! JSON Schema check for persisted cycle-record lines.

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::Value;

/// Schema every persisted record line must satisfy.
pub const CYCLE_RECORD_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/cycle_record/v1.schema.json"
));

static VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(CYCLE_RECORD_SCHEMA)
        .map_err(|err| format!("parse cycle record schema: {err}"))?;
    validator_for(&schema).map_err(|err| format!("invalid cycle record schema: {err}"))
});

/// Schema violations for one record, as stable messages. Empty means valid.
pub fn schema_errors(record: &Value) -> Result<Vec<String>> {
    let validator = VALIDATOR.as_ref().map_err(|err| anyhow!("{err}"))?;
    if validator.is_valid(record) {
        return Ok(Vec::new());
    }
    Ok(validator
        .iter_errors(record)
        .map(|err| err.to_string())
        .collect())
}
