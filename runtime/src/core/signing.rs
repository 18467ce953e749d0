//! Canonical serialization, hashing and hash-chain verification.
//!
//! Every hash in the cycle log is `SHA-256(canonical_json(value))`, hex-encoded.
//! Canonical JSON sorts object keys, uses no whitespace, and writes every
//! non-ASCII code point and every control character as a `\uXXXX` escape, so
//! value-equal inputs hash equal regardless of how they were constructed.

use std::fmt::{self, Write as _};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::types::{CycleRecord, TruncatedOutput};

/// Appended to inline content that was cut short.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Canonical JSON text of any serializable value.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).context("serialize value for canonical form")?;
    Ok(canonical_json_value(&value))
}

/// Canonical JSON text of an already-built JSON tree.
pub fn canonical_json_value(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// SHA-256 of the canonical form, hex-encoded (64 characters).
pub fn compute_hash<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(hash_text(&canonical_json(value)?))
}

pub fn compute_hash_value(value: &serde_json::Value) -> String {
    hash_text(&canonical_json_value(value))
}

/// SHA-256 of raw text, hex-encoded.
pub fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Hash of a record chained onto `prev_hash`.
///
/// The record's own `hash` field is excluded and its `prev_hash` field is
/// replaced by the supplied value, so the result depends only on the other
/// fields and the predecessor.
pub fn compute_cycle_hash(record: &CycleRecord, prev_hash: Option<&str>) -> Result<String> {
    let mut value = serde_json::to_value(record)
        .with_context(|| format!("serialize cycle {}", record.cycle_id))?;
    let fields = value
        .as_object_mut()
        .context("cycle record did not serialize to an object")?;
    fields.remove("hash");
    fields.insert(
        "prev_hash".to_string(),
        prev_hash.map_or(serde_json::Value::Null, |hash| {
            serde_json::Value::String(hash.to_string())
        }),
    );
    Ok(compute_hash_value(&value))
}

/// Why a chain failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainBreak {
    /// The stored hash does not match the recomputed one.
    HashMismatch { expected: String, found: String },
    /// The stored `prev_hash` does not name the preceding record.
    PrevHashMismatch {
        expected: Option<String>,
        found: Option<String>,
    },
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainBreak::HashMismatch { expected, found } => {
                write!(f, "hash mismatch: expected {expected}, found {found}")
            }
            ChainBreak::PrevHashMismatch { expected, found } => write!(
                f,
                "prev_hash mismatch: expected {}, found {}",
                expected.as_deref().unwrap_or("<none>"),
                found.as_deref().unwrap_or("<none>")
            ),
        }
    }
}

/// Diagnostic result of walking a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainReport {
    Valid {
        records: usize,
    },
    Broken {
        index: usize,
        cycle_id: String,
        reason: ChainBreak,
    },
}

impl ChainReport {
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainReport::Valid { .. })
    }
}

/// Walk `records` oldest-first and report the first break, if any.
///
/// Stops at the first mismatch; nothing is repaired or skipped.
pub fn verify_chain(records: &[CycleRecord]) -> Result<ChainReport> {
    let mut prev_hash: Option<&str> = None;
    for (index, record) in records.iter().enumerate() {
        if record.prev_hash.as_deref() != prev_hash {
            return Ok(ChainReport::Broken {
                index,
                cycle_id: record.cycle_id.clone(),
                reason: ChainBreak::PrevHashMismatch {
                    expected: prev_hash.map(str::to_string),
                    found: record.prev_hash.clone(),
                },
            });
        }
        let expected = compute_cycle_hash(record, prev_hash)?;
        if record.hash != expected {
            return Ok(ChainReport::Broken {
                index,
                cycle_id: record.cycle_id.clone(),
                reason: ChainBreak::HashMismatch {
                    expected,
                    found: record.hash.clone(),
                },
            });
        }
        prev_hash = Some(record.hash.as_str());
    }
    Ok(ChainReport::Valid {
        records: records.len(),
    })
}

/// True only when every record in `records` chains correctly.
pub fn verify_hash_chain(records: &[CycleRecord]) -> bool {
    matches!(verify_chain(records), Ok(report) if report.is_valid())
}

/// Keep at most `max_length` characters of `content` inline, hashing the whole.
///
/// Truncated content never exceeds `max_length` characters, so it is always
/// strictly shorter than the input. The marker is appended when the bound
/// leaves room for at least one character of content before it.
pub fn truncate_with_hash(content: &str, max_length: usize) -> TruncatedOutput {
    let hash = hash_text(&canonical_json_value(&serde_json::Value::String(
        content.to_string(),
    )));
    let full_length = content.chars().count();
    if full_length <= max_length {
        return TruncatedOutput {
            content: content.to_string(),
            truncated: false,
            hash,
            full_length,
        };
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    let keep = max_length.saturating_sub(marker_len);
    let inline = if keep > 0 {
        let mut prefix: String = content.chars().take(keep).collect();
        prefix.push_str(TRUNCATION_MARKER);
        prefix
    } else {
        content.chars().take(max_length).collect()
    };

    TruncatedOutput {
        content: inline,
        truncated: true,
        hash,
        full_length,
    }
}

fn write_value(out: &mut String, value: &serde_json::Value) {
    match value {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        serde_json::Value::Number(number) => {
            let _ = write!(out, "{number}");
        }
        serde_json::Value::String(text) => write_string(out, text),
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || !c.is_ascii() => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
