//! Stable exit codes for runtime CLI commands.

/// Command succeeded (a cycle ran, or the log audit came back clean).
pub const OK: i32 = 0;
/// Command failed due to invalid config, input, or storage errors.
pub const INVALID: i32 = 1;
/// `runtime verify` found a schema or hash-chain violation in the log.
pub const INTEGRITY: i32 = 2;
