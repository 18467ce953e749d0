//! Deterministic, pure logic shared by the runtime.
//!
//! Core modules must be free of I/O side effects. Anything that depends on the
//! clock takes the timestamp as an argument, so every function here returns the
//! same output for the same input.

pub mod eval;
pub mod planner;
pub mod reflection;
pub mod retrieval;
pub mod safety;
pub mod signing;
pub mod smoke;
pub mod tools;
pub mod types;
pub mod value;
pub mod version;
pub mod world_model;
