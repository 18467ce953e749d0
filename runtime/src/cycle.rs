//! Orchestration of one agent cycle.
//!
//! Phases run in a fixed order: observe, plan, safety check, act, preliminary
//! evaluation, reflect, world update, memory writes, finalize (hash + append),
//! evolve. Any phase error closes the cycle with a hashed failure record, so
//! each invocation advances the chain by exactly one record.

use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::core::eval::EvalHarness;
use crate::core::planner::plan_deterministic;
use crate::core::reflection::{failure_reflection, preliminary_reflection, reflect};
use crate::core::retrieval::MemoryItem;
use crate::core::safety::{RISKY_TOOLS, SafetyGate, redact_secrets, sandbox_rehearsal};
use crate::core::signing::{compute_cycle_hash, truncate_with_hash};
use crate::core::types::{
    ActionResult, ActionStatus, CycleRecord, EvalScores, MemoryType, MemoryWrite, PlanStep,
    SafetyAssessment, SafetyStatus, TruncatedOutput, WorldModel,
};
use crate::core::value::{Payload, Value};
use crate::core::version::evolve;
use crate::core::world_model::{relevant_constraints, summarize_world_model, update_world_model};
use crate::error::RuntimeError;
use crate::io::config::RuntimeConfig;
use crate::io::generator::{PlanPromptInputs, PromptEngine, TextGenerator, generate_plan};
use crate::io::memory::{MemoryStore, TieredMemory};
use crate::io::persistence::CycleLog;
use crate::io::tools::{DeterministicTools, ToolRunner};

/// State carried from one cycle to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    pub world_model: WorldModel,
    pub agent_version: String,
    /// Hash of the last persisted record; `None` starts a new chain.
    pub last_hash: Option<String>,
}

impl AgentState {
    pub fn new(agent_version: &str) -> Self {
        Self {
            world_model: WorldModel::default(),
            agent_version: agent_version.to_string(),
            last_hash: None,
        }
    }
}

/// State that follows `tail`: its hash, its resulting beliefs and the version
/// its score earns.
fn continue_from(tail: CycleRecord, evolve_threshold: f64) -> Result<AgentState> {
    let agent_version = evolve(
        &tail.agent_version,
        tail.eval_scores.overall_score,
        evolve_threshold,
    )
    .with_context(|| format!("continue chain from {}", tail.cycle_id))?;
    Ok(AgentState {
        world_model: tail.world_state_after,
        agent_version,
        last_hash: Some(tail.hash),
    })
}

/// Result of one cycle: the persisted record and the state for the next one.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub record: CycleRecord,
    pub next_state: AgentState,
}

/// Drives cycles over the core logic and the I/O collaborators.
pub struct Orchestrator {
    config: RuntimeConfig,
    gate: SafetyGate,
    harness: EvalHarness,
    log: CycleLog,
    memory: TieredMemory,
    generator: Option<Box<dyn TextGenerator>>,
    prompts: PromptEngine,
    tools: Box<dyn ToolRunner>,
    state: AgentState,
}

impl Orchestrator {
    /// Build an orchestrator with no memory store, no generator and
    /// deterministic tools, continuing whatever chain the log already holds.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let gate = SafetyGate::new(config.environment, config.safety.risky_confidence_threshold)
            .with_max_argument_depth(config.safety.max_argument_depth);
        let harness = EvalHarness::new(config.eval)?;
        let log = CycleLog::new(&config.log_dir)
            .with_lookback_days(config.persistence.latest_lookback_days);
        let state = AgentState::new(&config.agent_version);
        Self {
            config,
            gate,
            harness,
            log,
            memory: TieredMemory::default(),
            generator: None,
            prompts: PromptEngine::new(),
            tools: Box::new(DeterministicTools),
            state,
        }
        .resume()
    }

    pub fn with_memory(mut self, store: Box<dyn MemoryStore>) -> Self {
        self.memory = TieredMemory::new(Some(store));
        self
    }

    pub fn with_generator(mut self, generator: Box<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_tools(mut self, tools: Box<dyn ToolRunner>) -> Self {
        self.tools = tools;
        self
    }

    /// Continue the chain found in the log: adopt the tail record's hash,
    /// its resulting world model and the version it evolved to.
    pub fn resume(mut self) -> Result<Self> {
        let Some(tail) = self.log.tail()? else {
            debug!("no prior cycle; starting a new chain");
            return Ok(self);
        };
        info!(cycle_id = %tail.cycle_id, "resuming chain");
        self.state = continue_from(tail, self.config.cycle.evolve_threshold)?;
        Ok(self)
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn log(&self) -> &CycleLog {
        &self.log
    }

    pub fn memory(&self) -> &TieredMemory {
        &self.memory
    }

    /// Run one cycle and adopt its resulting state.
    ///
    /// If the log gained records this orchestrator did not write, the cycle
    /// chains onto the log tail instead of the held state.
    pub fn run_cycle(&mut self, goal: &str, input: &Payload) -> CycleRecord {
        self.sync_with_log();
        let outcome = self.execute(&self.state, goal, input);
        self.state = outcome.next_state;
        outcome.record
    }

    /// Run one cycle from `state` without touching the held state.
    ///
    /// Never fails: phase errors produce a persisted failure record instead.
    #[instrument(skip_all, fields(goal = %goal))]
    pub fn execute(&self, state: &AgentState, goal: &str, input: &Payload) -> CycleOutcome {
        let cycle_id = new_cycle_id();
        let started = timestamp();
        info!(%cycle_id, environment = %self.config.environment, "starting cycle");

        let attempt = self
            .run_phases(state, &cycle_id, &started, goal, input)
            .and_then(|(record, world_after)| {
                self.log.append_cycle(&record)?;
                Ok((record, world_after))
            });

        match attempt {
            Ok((record, world_after)) => {
                let score = record.eval_scores.overall_score;
                info!(
                    %cycle_id,
                    status = record.safety_assessment.status.as_str(),
                    score,
                    "cycle completed"
                );
                let agent_version = self.evolve_version(&state.agent_version, score);
                CycleOutcome {
                    next_state: AgentState {
                        world_model: world_after,
                        agent_version,
                        last_hash: Some(record.hash.clone()),
                    },
                    record,
                }
            }
            Err(err) => {
                let failure = RuntimeError::CycleFailure {
                    cycle_id: cycle_id.clone(),
                    message: format!("{err:#}"),
                };
                error!(error = %failure, "cycle failed");
                self.close_failed_cycle(state, &cycle_id, &started, goal, &format!("{err:#}"))
            }
        }
    }

    fn run_phases(
        &self,
        state: &AgentState,
        cycle_id: &str,
        started: &str,
        goal: &str,
        input: &Payload,
    ) -> Result<(CycleRecord, WorldModel)> {
        let mut record = CycleRecord::new(cycle_id, started, &state.agent_version, goal);
        record.world_state_before = state.world_model.clone();
        record.prev_hash = state.last_hash.clone();

        // Observe
        let world_summary = summarize_world_model(&state.world_model);
        let memories = self
            .memory
            .retrieve_relevant(goal, &world_summary, self.config.cycle.memory_k);
        let input_data = redact_secrets(input);
        record.observation =
            self.observation(goal, &input_data, &state.agent_version, &world_summary, &memories);

        // Plan
        record.plan = self.plan(goal, &state.world_model, &world_summary, &input_data);
        debug!(steps = record.plan.len(), "plan ready");

        // Safety check
        record.safety_assessment = self
            .gate
            .assess_plan(&record.plan, self.config.safety.plan_confidence);

        // Act
        match record.safety_assessment.status {
            SafetyStatus::Allowed => {
                for step in &record.plan {
                    let (action, output, violations) = self.act(step)?;
                    record.uncertainties.extend(violations);
                    record.tool_outputs.insert(step.tool.clone(), output);
                    record.actions_taken.push(action);
                }
            }
            SafetyStatus::Sandboxed => {
                warn!(reasons = ?record.safety_assessment.reasons, "plan requires sandbox rehearsal");
                for step in &record.plan {
                    if RISKY_TOOLS.contains(&step.tool.as_str()) {
                        let rehearsal = Value::Map(sandbox_rehearsal(step)).to_string();
                        record.tool_outputs.insert(
                            format!("{}:rehearsal", step.tool),
                            truncate_with_hash(&rehearsal, self.config.cycle.output_max_length),
                        );
                    }
                }
            }
            SafetyStatus::Blocked => {
                warn!(reasons = ?record.safety_assessment.reasons, "plan blocked by safety gate");
            }
        }
        if record.actions_taken.len() < record.plan.len() {
            record.uncertainties.push(format!(
                "Only {}/{} planned actions executed",
                record.actions_taken.len(),
                record.plan.len()
            ));
        }

        // Preliminary evaluation
        let mut draft = record.clone();
        draft.reflection = preliminary_reflection(&record.actions_taken);
        draft.world_state_after = state.world_model.clone();
        let preliminary = self.harness.evaluate_cycle(&draft);

        // Reflect
        record.reflection = reflect(
            &record.actions_taken,
            &record.safety_assessment,
            &preliminary,
        );

        // World update
        let world_after = update_world_model(
            &state.world_model,
            &record.observation,
            &record.actions_taken,
            &record.reflection,
            &timestamp(),
        );
        record.world_state_after = world_after.clone();

        // Memory writes
        record.memory_writes =
            self.store_lessons(cycle_id, &record.reflection.lessons_learned, &preliminary);

        // Finalize
        record.timestamp_end = timestamp();
        record.eval_scores = self.harness.evaluate_cycle(&record);
        record.confidence = record.eval_scores.overall_score;
        record.hash = compute_cycle_hash(&record, state.last_hash.as_deref())?;

        Ok((record, world_after))
    }

    fn observation(
        &self,
        goal: &str,
        input_data: &Payload,
        agent_version: &str,
        world_summary: &str,
        memories: &[MemoryItem],
    ) -> Payload {
        let mut observation = Payload::new();
        observation.insert("goal".to_string(), Value::from(goal));
        observation.insert("input_data".to_string(), Value::Map(input_data.clone()));
        observation.insert("timestamp".to_string(), Value::from(timestamp()));
        observation.insert("agent_version".to_string(), Value::from(agent_version));
        observation.insert(
            "relevant_memories".to_string(),
            Value::List(memories.iter().map(MemoryItem::to_value).collect()),
        );
        observation.insert("world_summary".to_string(), Value::from(world_summary));
        observation.insert(
            "environment".to_string(),
            Value::from(self.config.environment.as_str()),
        );
        if let Some(Value::String(task_type)) = input_data.get("task_type") {
            observation.insert("task_type".to_string(), Value::from(task_type.as_str()));
        }
        observation
    }

    fn plan(
        &self,
        goal: &str,
        world: &WorldModel,
        world_summary: &str,
        input_data: &Payload,
    ) -> Vec<PlanStep> {
        if let Some(generator) = &self.generator {
            let inputs = PlanPromptInputs {
                goal,
                world_summary,
                constraints: relevant_constraints(world, goal),
                allowed_tools: self
                    .gate
                    .environment()
                    .allowed_tools()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                input_data,
            };
            match generate_plan(generator.as_ref(), &self.prompts, &inputs) {
                Ok(plan) => return plan,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "generated plan unusable; using rule-based planner");
                }
            }
        }
        plan_deterministic(goal, input_data)
    }

    /// Execute one approved step. Tripwire hits flag the action and are
    /// returned as uncertainties.
    fn act(&self, step: &PlanStep) -> Result<(ActionResult, TruncatedOutput, Vec<String>)> {
        let at = timestamp();
        let clock = Instant::now();
        let output = self
            .tools
            .run(&step.tool, &step.args)
            .with_context(|| format!("run tool {}", step.tool))?;
        let execution_time_ms = clock.elapsed().as_secs_f64() * 1000.0;

        let text = output.to_text();
        let truncated = truncate_with_hash(&text, self.config.cycle.output_max_length);
        let violations = self.gate.assess_tool_output(&text);
        let status = if violations.is_empty() {
            ActionStatus::Success
        } else {
            warn!(tool = %step.tool, ?violations, "tool output tripped safety checks");
            ActionStatus::Flagged
        };
        debug!(tool = %step.tool, execution_time_ms, "tool finished");

        let action = ActionResult {
            tool: step.tool.clone(),
            args: step.args.clone(),
            output: truncated.content.clone(),
            output_hash: truncated.hash.clone(),
            status,
            timestamp: at,
            execution_time_ms,
        };
        let uncertainties = violations
            .into_iter()
            .map(|violation| format!("{} output: {violation}", step.tool))
            .collect();
        Ok((action, truncated, uncertainties))
    }

    /// Write each lesson as a semantic memory. Store failures are skipped.
    fn store_lessons(
        &self,
        cycle_id: &str,
        lessons: &[String],
        scores: &EvalScores,
    ) -> Vec<MemoryWrite> {
        let mut writes = Vec::new();
        for lesson in lessons {
            match self
                .memory
                .store_semantic(lesson, "lesson", scores.overall_score)
            {
                Ok(memory_id) => {
                    let mut metadata = Payload::new();
                    metadata.insert("cycle_id".to_string(), Value::from(cycle_id));
                    writes.push(MemoryWrite {
                        memory_type: MemoryType::Semantic,
                        memory_id,
                        content: lesson.clone(),
                        metadata,
                    });
                }
                Err(err) => warn!(error = %err, "failed to store semantic memory"),
            }
        }
        writes
    }

    fn sync_with_log(&mut self) {
        let tail = match self.log.tail() {
            Ok(Some(tail)) => tail,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "cannot read log tail; keeping held state");
                return;
            }
        };
        if self.state.last_hash.as_deref() == Some(tail.hash.as_str()) {
            return;
        }
        let cycle_id = tail.cycle_id.clone();
        match continue_from(tail, self.config.cycle.evolve_threshold) {
            Ok(state) => {
                warn!(%cycle_id, "log advanced elsewhere; chaining onto its tail");
                self.state = state;
            }
            Err(err) => {
                warn!(%cycle_id, error = %format!("{err:#}"), "cannot adopt log tail; keeping held state");
            }
        }
    }

    fn evolve_version(&self, current: &str, score: f64) -> String {
        match evolve(current, score, self.config.cycle.evolve_threshold) {
            Ok(next) => {
                if next != current {
                    info!(from = current, to = %next, "agent evolved");
                }
                next
            }
            Err(err) => {
                warn!(error = %err, "keeping agent version");
                current.to_string()
            }
        }
    }

    /// Build, hash and append the terminal record for a failed cycle.
    fn close_failed_cycle(
        &self,
        state: &AgentState,
        cycle_id: &str,
        started: &str,
        goal: &str,
        message: &str,
    ) -> CycleOutcome {
        let mut record = CycleRecord::new(cycle_id, started, &state.agent_version, goal);
        record.timestamp_end = timestamp();
        record
            .observation
            .insert("error".to_string(), Value::from(message));
        record.world_state_before = state.world_model.clone();
        record.world_state_after = state.world_model.clone();
        record.safety_assessment = SafetyAssessment::cycle_failure(message);
        record.eval_scores = EvalScores::zero();
        record.reflection = failure_reflection(message);
        record.prev_hash = state.last_hash.clone();

        let mut next_state = state.clone();
        let persisted = compute_cycle_hash(&record, state.last_hash.as_deref()).and_then(|hash| {
            record.hash = hash;
            self.log.append_cycle(&record)
        });
        match persisted {
            Ok(path) => {
                debug!(path = %path.display(), "failure record persisted");
                next_state.last_hash = Some(record.hash.clone());
            }
            Err(err) => error!(%cycle_id, error = %format!("{err:#}"), "failure record not persisted"),
        }
        CycleOutcome { record, next_state }
    }
}

fn new_cycle_id() -> String {
    format!("cycle_{:08x}", rand::random::<u32>())
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::safety::Environment;
    use crate::test_support::payload;
    use serde_json::json;

    fn orchestrator(env: Environment) -> (tempfile::TempDir, Orchestrator) {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = RuntimeConfig {
            environment: env,
            log_dir: temp.path().to_path_buf(),
            ..RuntimeConfig::default()
        };
        (temp, Orchestrator::new(config).expect("orchestrator"))
    }

    #[test]
    fn cycle_ids_are_prefixed_hex() {
        let id = new_cycle_id();
        assert!(id.starts_with("cycle_"));
        assert_eq!(id.len(), 14);
        assert!(id[6..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    /// Observations carry the redacted input and promote a string task type.
    #[test]
    fn observation_redacts_input_and_promotes_task_type() {
        let (_temp, orch) = orchestrator(Environment::Development);
        let input = redact_secrets(&payload(json!({"task_type": "ingest", "password": "x"})));
        let observation = orch.observation("goal", &input, "1.0.0", "World model is empty", &[]);
        assert_eq!(observation["task_type"], Value::from("ingest"));
        assert_eq!(observation["environment"], Value::from("development"));
        let data = observation["input_data"].as_map().expect("map");
        assert_eq!(data["password"], Value::from("***REDACTED***"));
        for key in ["goal", "timestamp", "agent_version", "relevant_memories", "world_summary"] {
            assert!(observation.contains_key(key), "{key}");
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RuntimeConfig {
            agent_version: "bad".to_string(),
            ..RuntimeConfig::default()
        };
        assert!(Orchestrator::new(config).is_err());
    }

    #[test]
    fn failed_version_parse_keeps_current() {
        let (_temp, orch) = orchestrator(Environment::Production);
        assert_eq!(orch.evolve_version("not-a-version", 0.99), "not-a-version");
        assert_eq!(orch.evolve_version("1.0.0", 0.99), "1.0.1");
    }
}
