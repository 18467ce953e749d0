//! Record types shared by every runtime component.
//!
//! These types define the persisted contract: a [`CycleRecord`] serializes to
//! one JSON line in the cycle log, and its hash covers every field here. Field
//! names are part of the on-disk format and must stay stable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::value::Payload;

/// Overall verdict of the safety gate for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyStatus {
    /// Every step passed; the plan may execute.
    Allowed,
    /// At least one step was rejected; nothing executes.
    Blocked,
    /// No step was rejected, but a risky step needs rehearsal first.
    Sandboxed,
}

impl SafetyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyStatus::Allowed => "allowed",
            SafetyStatus::Blocked => "blocked",
            SafetyStatus::Sandboxed => "sandboxed",
        }
    }
}

/// Single step in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool: String,
    #[serde(default)]
    pub args: Payload,
    pub expected_outcome: String,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Outcome classification of an executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    /// The tool ran, but its output tripped an injection or secret check.
    Flagged,
}

/// Result of executing one plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub tool: String,
    pub args: Payload,
    /// Possibly truncated output text.
    pub output: String,
    /// Hash of the full, untruncated output.
    pub output_hash: String,
    pub status: ActionStatus,
    pub timestamp: String,
    pub execution_time_ms: f64,
}

/// Inline evidence for a tool output: a bounded prefix plus a hash of the whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncatedOutput {
    pub content: String,
    pub truncated: bool,
    pub hash: String,
    pub full_length: usize,
}

/// Safety evaluation of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub status: SafetyStatus,
    /// Tools permitted in the gate's environment, sorted.
    pub allowed_tools: Vec<String>,
    /// Tools of rejected steps, in plan order.
    pub blocked_tools: Vec<String>,
    pub reasons: Vec<String>,
    pub risk_flags: Vec<String>,
    pub sandbox_required: bool,
}

impl SafetyAssessment {
    /// Terminal assessment attached to a failed cycle.
    pub fn cycle_failure(message: &str) -> Self {
        Self {
            status: SafetyStatus::Blocked,
            allowed_tools: Vec::new(),
            blocked_tools: Vec::new(),
            reasons: vec![format!("Cycle failed: {message}")],
            risk_flags: vec!["cycle_failure".to_string()],
            sandbox_required: false,
        }
    }
}

/// Evaluation scores for a cycle, each in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalScores {
    pub reasoning_score: f64,
    pub planning_score: f64,
    pub tool_use_score: f64,
    pub safety_score: f64,
    pub overall_score: f64,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl EvalScores {
    pub fn zero() -> Self {
        Self {
            reasoning_score: 0.0,
            planning_score: 0.0,
            tool_use_score: 0.0,
            safety_score: 0.0,
            overall_score: 0.0,
            details: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Episodic,
    Semantic,
    Procedural,
}

impl MemoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
        }
    }

    /// Tier named by a metadata tag; `None` for anything else.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "episodic" => Some(MemoryType::Episodic),
            "semantic" => Some(MemoryType::Semantic),
            "procedural" => Some(MemoryType::Procedural),
            _ => None,
        }
    }
}

/// Record of one write to the memory collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryWrite {
    pub memory_type: MemoryType,
    pub memory_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldRelation {
    pub from_id: String,
    pub to_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub metadata: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConstraint {
    /// `safety`, `task` or `environment`.
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub enforced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldHypothesis {
    pub claim: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    pub timestamp: String,
    pub event: String,
    #[serde(default)]
    pub refs: Vec<String>,
}

/// Belief-state snapshot. Updates always produce a new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldModel {
    #[serde(default)]
    pub entities: Vec<WorldEntity>,
    #[serde(default)]
    pub relations: Vec<WorldRelation>,
    #[serde(default)]
    pub constraints: Vec<WorldConstraint>,
    #[serde(default)]
    pub hypotheses: Vec<WorldHypothesis>,
    #[serde(default)]
    pub timeline: Vec<WorldEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    pub what_worked: Vec<String>,
    pub what_failed: Vec<String>,
    pub next_steps: Vec<String>,
    pub lessons_learned: Vec<String>,
}

/// Complete record of one cycle: the unit that is hashed, chained and persisted.
///
/// `hash` stays empty until every other field is final, and is only ever
/// produced by [`compute_cycle_hash`](crate::core::signing::compute_cycle_hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle_id: String,
    pub timestamp_start: String,
    pub timestamp_end: String,
    pub agent_version: String,

    pub goal_stack: Vec<String>,
    pub observation: Payload,

    pub world_state_before: WorldModel,
    pub world_state_after: WorldModel,

    pub plan: Vec<PlanStep>,
    pub actions_taken: Vec<ActionResult>,
    pub tool_outputs: BTreeMap<String, TruncatedOutput>,

    pub safety_assessment: SafetyAssessment,
    pub eval_scores: EvalScores,
    pub reflection: Reflection,
    pub memory_writes: Vec<MemoryWrite>,
    pub artifacts: Vec<String>,

    pub confidence: f64,
    pub uncertainties: Vec<String>,

    pub prev_hash: Option<String>,
    pub hash: String,
}

impl CycleRecord {
    /// Blank record for a cycle that has just started.
    ///
    /// The safety assessment starts out `Blocked` with no reasons: nothing may
    /// execute until the gate has actually assessed a plan.
    pub fn new(cycle_id: &str, timestamp_start: &str, agent_version: &str, goal: &str) -> Self {
        Self {
            cycle_id: cycle_id.to_string(),
            timestamp_start: timestamp_start.to_string(),
            timestamp_end: timestamp_start.to_string(),
            agent_version: agent_version.to_string(),
            goal_stack: vec![goal.to_string()],
            observation: Payload::new(),
            world_state_before: WorldModel::default(),
            world_state_after: WorldModel::default(),
            plan: Vec::new(),
            actions_taken: Vec::new(),
            tool_outputs: BTreeMap::new(),
            safety_assessment: SafetyAssessment {
                status: SafetyStatus::Blocked,
                allowed_tools: Vec::new(),
                blocked_tools: Vec::new(),
                reasons: Vec::new(),
                risk_flags: Vec::new(),
                sandbox_required: false,
            },
            eval_scores: EvalScores::zero(),
            reflection: Reflection::default(),
            memory_writes: Vec::new(),
            artifacts: Vec::new(),
            confidence: 0.0,
            uncertainties: Vec::new(),
            prev_hash: None,
            hash: String::new(),
        }
    }
}
