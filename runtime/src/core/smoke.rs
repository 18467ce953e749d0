//! Fixed smoke suite: four canned scenarios checked for their expected
//! structural outcome. A build-health gate, not a statistical evaluation.

use serde::Serialize;

use crate::core::eval::EvalHarness;
use crate::core::safety::{Environment, SafetyGate};
use crate::core::signing::{compute_hash, truncate_with_hash};
use crate::core::types::{
    ActionResult, ActionStatus, CycleRecord, PlanStep, Reflection, SafetyStatus, WorldConstraint,
};
use crate::core::value::{Payload, Value};

const SMOKE_TIMESTAMP: &str = "2026-01-01T00:00:00.000000Z";
const SMOKE_VERSION: &str = "0.0.0";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmokeResult {
    pub name: &'static str,
    pub passed: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmokeReport {
    pub overall_passed: bool,
    pub tests: Vec<SmokeResult>,
    pub summary: String,
}

/// Run all four scenarios in a fixed order.
pub fn run_smoke_suite() -> SmokeReport {
    let tests = vec![
        reasoning_smoke(),
        planning_smoke(),
        tool_use_smoke(),
        safety_smoke(),
    ];
    let passed = tests.iter().filter(|test| test.passed).count();
    let overall_passed = passed == tests.len();
    let summary = format!("{passed}/{} smoke tests passed", tests.len());
    SmokeReport {
        overall_passed,
        tests,
        summary,
    }
}

fn smoke_record(name: &str) -> CycleRecord {
    CycleRecord::new(name, SMOKE_TIMESTAMP, SMOKE_VERSION, name)
}

fn result(name: &'static str, passed: bool, ok: &str, failed: String) -> SmokeResult {
    SmokeResult {
        name,
        passed,
        message: if passed { ok.to_string() } else { failed },
    }
}

/// A well-formed reflection earns a high reasoning score.
pub fn reasoning_smoke() -> SmokeResult {
    let mut record = smoke_record("reasoning_smoke");
    record.reflection = Reflection {
        what_worked: vec!["Task completed successfully".to_string()],
        what_failed: Vec::new(),
        next_steps: vec!["Continue monitoring".to_string()],
        lessons_learned: vec!["Validation is important".to_string()],
    };
    let score = EvalHarness::default().evaluate_cycle(&record).reasoning_score;
    result(
        "reasoning_smoke",
        score >= 0.85,
        "Reflection structure scores as sound reasoning",
        format!("Reasoning score {score:.2} below 0.85"),
    )
}

/// A plan whose rationale addresses a validation constraint scores fully.
pub fn planning_smoke() -> SmokeResult {
    let mut record = smoke_record("planning_smoke");
    let mut args = Payload::new();
    args.insert("data".to_string(), Value::from("test"));
    record.plan = vec![PlanStep {
        tool: "validate_json".to_string(),
        args,
        expected_outcome: "Validation passes".to_string(),
        rationale: Some("Must validate before processing".to_string()),
    }];
    record.world_state_before.constraints.push(WorldConstraint {
        kind: "task".to_string(),
        description: "Validation required before processing".to_string(),
        enforced: true,
    });

    let score = EvalHarness::default().evaluate_cycle(&record).planning_score;
    let considers_constraint = record.plan[0]
        .rationale
        .as_deref()
        .is_some_and(|rationale| rationale.to_lowercase().contains("validat"));
    result(
        "planning_smoke",
        considers_constraint && (score - 1.0).abs() < 1e-9,
        "Plan considers the validation constraint",
        format!("Plan ignores constraints (planning score {score:.2})"),
    )
}

/// Truncated tool output keeps a hash of the full output.
pub fn tool_use_smoke() -> SmokeResult {
    let output = "file contents ".repeat(64);
    let truncated = truncate_with_hash(&output, 100);
    let full_hash = compute_hash(&output).unwrap_or_default();
    let mut args = Payload::new();
    args.insert("path".to_string(), Value::from("/test.txt"));
    let action = ActionResult {
        tool: "read_file".to_string(),
        args,
        output: truncated.content.clone(),
        output_hash: truncated.hash.clone(),
        status: ActionStatus::Success,
        timestamp: SMOKE_TIMESTAMP.to_string(),
        execution_time_ms: 0.0,
    };
    let passed = action.status == ActionStatus::Success
        && truncated.truncated
        && action.output_hash.len() == 64
        && action.output_hash == full_hash;
    result(
        "tool_use_smoke",
        passed,
        "Tool output evidence hashes the full output",
        "Tool output hash does not cover the full output".to_string(),
    )
}

/// An injected script in a risky step's arguments is blocked.
pub fn safety_smoke() -> SmokeResult {
    let gate = SafetyGate::new(Environment::Development, 0.7);
    let mut args = Payload::new();
    args.insert(
        "command".to_string(),
        Value::from("<script>alert('xss')</script>"),
    );
    let plan = vec![PlanStep {
        tool: "execute_command".to_string(),
        args,
        expected_outcome: "Execute script".to_string(),
        rationale: None,
    }];
    let assessment = gate.assess_plan(&plan, 0.5);
    let passed = assessment.status == SafetyStatus::Blocked
        && assessment.blocked_tools == vec!["execute_command".to_string()]
        && assessment
            .risk_flags
            .iter()
            .any(|flag| flag == "injection_detected");
    result(
        "safety_smoke",
        passed,
        "Safety gate blocks injected script",
        format!(
            "Safety gate returned {} for injected script",
            assessment.status.as_str()
        ),
    )
}
