//! Memory collaborator contract and the three-tier memory facade.
//!
//! The store itself (storage, embedding, search) lives outside this crate;
//! only its read/write contract matters here. [`TieredMemory`] layers
//! episodic/semantic/procedural conventions and deterministic re-ranking on
//! top, and degrades to local ids and empty retrieval when no store is wired.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::core::retrieval::{MemoryHit, MemoryItem, rank_memories};
use crate::core::types::{CycleRecord, MemoryType};
use crate::core::value::{Payload, Value};

/// External long-term memory store.
pub trait MemoryStore {
    /// Persist `content` with `metadata`; returns the store-assigned id.
    fn write(&self, content: &str, metadata: &Payload) -> Result<String>;

    /// Up to `limit` hits for `query`, best first.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>>;
}

impl<T: MemoryStore + ?Sized> MemoryStore for Rc<T> {
    fn write(&self, content: &str, metadata: &Payload) -> Result<String> {
        (**self).write(content, metadata)
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>> {
        (**self).search(query, limit)
    }
}

/// Episodic, semantic and procedural memory over an optional store.
#[derive(Default)]
pub struct TieredMemory {
    store: Option<Box<dyn MemoryStore>>,
    local_writes: Cell<u64>,
}

impl TieredMemory {
    pub fn new(store: Option<Box<dyn MemoryStore>>) -> Self {
        Self {
            store,
            local_writes: Cell::new(0),
        }
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Record a cycle as an episode.
    pub fn store_episodic(&self, record: &CycleRecord) -> Result<String> {
        let Some(store) = &self.store else {
            return Ok(format!("episodic_{}", record.cycle_id));
        };
        let content = format!(
            "Cycle {}: {}",
            record.cycle_id,
            record.goal_stack.join(" > ")
        );
        let mut metadata = tagged(MemoryType::Episodic);
        metadata.insert("cycle_id".to_string(), Value::from(record.cycle_id.as_str()));
        metadata.insert(
            "timestamp".to_string(),
            Value::from(record.timestamp_start.as_str()),
        );
        metadata.insert(
            "agent_version".to_string(),
            Value::from(record.agent_version.as_str()),
        );
        metadata.insert("goal_stack".to_string(), Value::from(record.goal_stack.clone()));
        metadata.insert(
            "success".to_string(),
            Value::Bool(record.reflection.what_failed.is_empty()),
        );
        metadata.insert(
            "eval_score".to_string(),
            Value::from(record.eval_scores.overall_score),
        );
        let id = store.write(&content, &metadata)?;
        debug!(memory_id = %id, cycle_id = %record.cycle_id, "stored episodic memory");
        Ok(id)
    }

    /// Record a distilled fact or learned constraint.
    pub fn store_semantic(&self, fact: &str, category: &str, confidence: f64) -> Result<String> {
        let Some(store) = &self.store else {
            return Ok(format!("semantic_{}", self.next_local_id()));
        };
        let mut metadata = tagged(MemoryType::Semantic);
        metadata.insert("category".to_string(), Value::from(category));
        metadata.insert("confidence".to_string(), Value::from(confidence));
        metadata.insert("timestamp".to_string(), Value::from(now()));
        let id = store.write(fact, &metadata)?;
        debug!(memory_id = %id, category, "stored semantic memory");
        Ok(id)
    }

    /// Record a verified skill.
    pub fn store_procedural(
        &self,
        skill: &str,
        procedure: &Payload,
        preconditions: &[String],
    ) -> Result<String> {
        let Some(store) = &self.store else {
            return Ok(format!("procedural_{skill}"));
        };
        let mut metadata = tagged(MemoryType::Procedural);
        metadata.insert("skill_name".to_string(), Value::from(skill));
        metadata.insert("procedure".to_string(), Value::Map(procedure.clone()));
        metadata.insert(
            "preconditions".to_string(),
            Value::from(preconditions.to_vec()),
        );
        metadata.insert("verified".to_string(), Value::Bool(true));
        metadata.insert("timestamp".to_string(), Value::from(now()));
        let id = store.write(&format!("Skill: {skill}"), &metadata)?;
        debug!(memory_id = %id, skill, "stored procedural memory");
        Ok(id)
    }

    /// Up to `k` memories relevant to `goal` under the current world summary.
    ///
    /// Search failures are logged and yield nothing.
    pub fn retrieve_relevant(&self, goal: &str, world_summary: &str, k: usize) -> Vec<MemoryItem> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        let query = format!("{goal} {world_summary}");
        match store.search(&query, k) {
            Ok(hits) => {
                let items = hits.into_iter().map(MemoryItem::from_hit).collect();
                let ranked = rank_memories(goal, items, Utc::now(), k);
                debug!(count = ranked.len(), "retrieved memories");
                ranked
            }
            Err(err) => {
                warn!(error = %err, "memory search failed");
                Vec::new()
            }
        }
    }

    fn next_local_id(&self) -> u64 {
        let next = self.local_writes.get() + 1;
        self.local_writes.set(next);
        next
    }
}

fn tagged(kind: MemoryType) -> Payload {
    let mut metadata = Payload::new();
    metadata.insert("memory_type".to_string(), Value::from(kind.as_str()));
    metadata
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
