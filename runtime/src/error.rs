//! Typed error categories for the runtime.
//!
//! Most paths return `anyhow::Result` with context. These variants travel
//! inside `anyhow::Error` when a caller needs to branch on the category
//! (`err.downcast_ref::<RuntimeError>()`), e.g. to pick a CLI exit code.
//!
//! Blocked and sandboxed plans are not errors: they are recorded as
//! [`SafetyStatus`](crate::core::types::SafetyStatus) on the cycle record.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A persisted chain failed verification. Reported, never repaired.
    #[error("integrity violation at record {index} ({cycle_id}): {detail}")]
    IntegrityViolation {
        index: usize,
        cycle_id: String,
        detail: String,
    },

    /// Log or artifact access was rejected before touching the filesystem.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A phase failed inside a cycle; the cycle is closed with a failure record.
    #[error("cycle {cycle_id} failed: {message}")]
    CycleFailure { cycle_id: String, message: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid agent version '{0}' (expected major.minor.patch)")]
    InvalidVersion(String),
}
