//! I/O adapters: configuration, the cycle log, and collaborator seams.
//!
//! Everything that touches the filesystem, the clock, or an external service
//! lives here, behind traits where tests need to script behavior.

pub mod config;
pub mod generator;
pub mod memory;
pub mod persistence;
pub mod record_schema;
pub mod tools;
