//! Tool execution seam.
//!
//! The cycle invokes tools only through [`ToolRunner`]. The default runner is
//! the deterministic stand-in; real sandboxed execution would plug in here.

use std::rc::Rc;

use anyhow::Result;

use crate::core::tools::deterministic_output;
use crate::core::value::{Payload, Value};

pub trait ToolRunner {
    /// Run `tool` with `args`. An `Err` aborts the cycle into a failure record.
    fn run(&self, tool: &str, args: &Payload) -> Result<Value>;
}

impl<T: ToolRunner + ?Sized> ToolRunner for Rc<T> {
    fn run(&self, tool: &str, args: &Payload) -> Result<Value> {
        (**self).run(tool, args)
    }
}

/// Runner backed by [`deterministic_output`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicTools;

impl ToolRunner for DeterministicTools {
    fn run(&self, tool: &str, args: &Payload) -> Result<Value> {
        Ok(deterministic_output(tool, args))
    }
}
