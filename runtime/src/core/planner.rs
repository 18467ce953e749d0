//! Plan derivation: the deterministic rule-based planner and parsing of
//! generated plans.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::PlanStep;
use crate::core::value::{Payload, Value};
use crate::error::RuntimeError;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence regex should be valid"));

/// Rule-based planner: keyword matches on the goal select canned steps.
///
/// - `validat` adds a `validate_json` step over the input data.
/// - `analyz` or `process` adds an `analyze_data` step over the input data.
/// - No match yields a single default `read_file` step.
pub fn plan_deterministic(goal: &str, input_data: &Payload) -> Vec<PlanStep> {
    let goal = goal.to_lowercase();
    let mut plan = Vec::new();

    if goal.contains("validat") {
        plan.push(step(
            "validate_json",
            data_args(input_data),
            "Data passes validation",
            "Validation required before processing",
        ));
    }

    if goal.contains("analyz") || goal.contains("process") {
        plan.push(step(
            "analyze_data",
            data_args(input_data),
            "Data analyzed successfully",
            "Analyze input to extract insights",
        ));
    }

    if plan.is_empty() {
        let mut args = Payload::new();
        args.insert("path".to_string(), Value::from("/default"));
        plan.push(step(
            "read_file",
            args,
            "File read successfully",
            "Default action for goal",
        ));
    }

    plan
}

/// Parse a generated reply into plan steps.
///
/// Accepts a bare JSON array, a fenced ```json block, or prose around the
/// outermost `[...]`. An empty plan is rejected so the caller can fall back.
pub fn parse_generated_plan(reply: &str) -> Result<Vec<PlanStep>, RuntimeError> {
    let body = FENCE_RE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map_or(reply, |m| m.as_str());

    let start = body.find('[');
    let end = body.rfind(']');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => {
            return Err(RuntimeError::InvalidPayload(
                "generated plan contains no JSON array".to_string(),
            ));
        }
    };

    let plan: Vec<PlanStep> = serde_json::from_str(json)
        .map_err(|err| RuntimeError::InvalidPayload(format!("generated plan: {err}")))?;
    if plan.is_empty() {
        return Err(RuntimeError::InvalidPayload(
            "generated plan has no steps".to_string(),
        ));
    }
    Ok(plan)
}

fn data_args(input_data: &Payload) -> Payload {
    let mut args = Payload::new();
    args.insert("data".to_string(), Value::Map(input_data.clone()));
    args
}

fn step(tool: &str, args: Payload, expected: &str, rationale: &str) -> PlanStep {
    PlanStep {
        tool: tool.to_string(),
        args,
        expected_outcome: expected.to_string(),
        rationale: Some(rationale.to_string()),
    }
}
