//! Test-only builders for records and scripted collaborators.

use std::cell::RefCell;

use anyhow::{Result, bail};

use crate::core::retrieval::MemoryHit;
use crate::core::signing::{compute_cycle_hash, hash_text};
use crate::core::types::{ActionResult, ActionStatus, CycleRecord, PlanStep};
use crate::core::value::{Payload, Value, payload_from_json};
use crate::io::generator::TextGenerator;
use crate::io::memory::MemoryStore;
use crate::io::tools::ToolRunner;

/// Convert a `json!` object literal into a payload.
pub fn payload(json: serde_json::Value) -> Payload {
    payload_from_json(json).expect("payload literal")
}

/// A plan step expecting `"ok"`, without rationale.
pub fn plan_step(tool: &str, args: Payload) -> PlanStep {
    PlanStep {
        tool: tool.to_string(),
        args,
        expected_outcome: "ok".to_string(),
        rationale: None,
    }
}

/// A successful action with a well-formed output hash.
pub fn success_action(tool: &str) -> ActionResult {
    ActionResult {
        tool: tool.to_string(),
        args: Payload::new(),
        output: "{\"ok\":true}".to_string(),
        output_hash: hash_text(tool),
        status: ActionStatus::Success,
        timestamp: "2026-01-15T10:00:01.000000Z".to_string(),
        execution_time_ms: 1.5,
    }
}

/// An unhashed record started 2026-01-15 10:00 UTC with an empty plan,
/// no actions and a blocked assessment.
pub fn sample_record(cycle_id: &str) -> CycleRecord {
    let mut record = CycleRecord::new(
        cycle_id,
        "2026-01-15T10:00:00.000000Z",
        "1.0.0",
        "validate data",
    );
    record.timestamp_end = "2026-01-15T10:00:02.000000Z".to_string();
    record
        .observation
        .insert("goal".to_string(), Value::from("validate data"));
    record
}

/// A correctly hashed chain, one record per start timestamp.
pub fn chain_at(starts: &[&str]) -> Vec<CycleRecord> {
    let mut records = Vec::with_capacity(starts.len());
    let mut prev: Option<String> = None;
    for (index, start) in starts.iter().enumerate() {
        let mut record = sample_record(&format!("cycle_{index:04}"));
        record.timestamp_start = (*start).to_string();
        record.timestamp_end = (*start).to_string();
        record.prev_hash = prev.clone();
        record.hash = compute_cycle_hash(&record, prev.as_deref()).expect("hash");
        prev = Some(record.hash.clone());
        records.push(record);
    }
    records
}

/// `n` chained records, one minute apart, all on 2026-01-15.
pub fn chained_records(n: usize) -> Vec<CycleRecord> {
    let starts: Vec<String> = (0..n)
        .map(|minute| format!("2026-01-15T10:{:02}:00.000000Z", minute % 60))
        .collect();
    let starts: Vec<&str> = starts.iter().map(String::as_str).collect();
    chain_at(&starts)
}

/// In-memory store that records writes and queries and serves fixed hits.
#[derive(Default)]
pub struct ScriptedMemory {
    hits: Vec<MemoryHit>,
    fail: bool,
    writes: RefCell<Vec<(String, Payload)>>,
    queries: RefCell<Vec<String>>,
}

impl ScriptedMemory {
    /// Serve `(id, content, memory_type)` hits in the given order.
    pub fn with_hits(hits: Vec<(&str, &str, &str)>) -> Self {
        let hits = hits
            .into_iter()
            .map(|(id, content, memory_type)| {
                let mut metadata = Payload::new();
                metadata.insert("memory_type".to_string(), Value::from(memory_type));
                MemoryHit {
                    id: id.to_string(),
                    content: content.to_string(),
                    metadata,
                }
            })
            .collect();
        Self {
            hits,
            ..Self::default()
        }
    }

    /// Every write and search fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> Vec<(String, Payload)> {
        self.writes.borrow().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.borrow().clone()
    }
}

impl MemoryStore for ScriptedMemory {
    fn write(&self, content: &str, metadata: &Payload) -> Result<String> {
        if self.fail {
            bail!("memory store unavailable");
        }
        let mut writes = self.writes.borrow_mut();
        writes.push((content.to_string(), metadata.clone()));
        Ok(format!("mem_{}", writes.len()))
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>> {
        self.queries.borrow_mut().push(query.to_string());
        if self.fail {
            bail!("memory store unavailable");
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

/// Generator that returns a fixed reply (or fails) and records prompts.
pub struct ScriptedGenerator {
    reply: Option<String>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => bail!("generator unavailable"),
        }
    }
}

/// Tool runner whose every invocation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingTools;

impl ToolRunner for FailingTools {
    fn run(&self, tool: &str, _args: &Payload) -> Result<Value> {
        bail!("tool {tool} crashed")
    }
}

/// Tool runner that returns the same output for every tool.
#[derive(Debug, Clone)]
pub struct FixedTools(pub Value);

impl ToolRunner for FixedTools {
    fn run(&self, _tool: &str, _args: &Payload) -> Result<Value> {
        Ok(self.0.clone())
    }
}
