//! Auditable single-agent cycle runtime.
//!
//! Every invocation runs one fixed cycle (observe, plan, safety-check, act,
//! evaluate, reflect, update beliefs, persist, evolve) and leaves exactly one
//! hash-chained record behind. The crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (schema, signing, safety gate,
//!   world model, planning, scoring). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (config, cycle log, collaborators).
//!   Isolated behind traits so tests can script them.
//!
//! [`cycle`] drives one cycle over both layers; [`verify`] audits a persisted
//! log after the fact.

pub mod core;
pub mod cycle;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod verify;
