//! Deterministic scoring of a cycle across four axes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{ActionStatus, CycleRecord, EvalScores, SafetyStatus};
use crate::error::RuntimeError;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Weights combining the four sub-scores into the overall score.
///
/// Each weight lies in `[0, 1]` and together they sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalWeights {
    pub reasoning: f64,
    pub planning: f64,
    pub tool_use: f64,
    pub safety: f64,
}

impl Default for EvalWeights {
    fn default() -> Self {
        Self {
            reasoning: 0.25,
            planning: 0.25,
            tool_use: 0.25,
            safety: 0.25,
        }
    }
}

impl EvalWeights {
    pub fn validate(&self) -> Result<(), RuntimeError> {
        let named = [
            ("reasoning", self.reasoning),
            ("planning", self.planning),
            ("tool_use", self.tool_use),
            ("safety", self.safety),
        ];
        for (name, weight) in named {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(RuntimeError::InvalidConfig(format!(
                    "eval weight {name} must be within [0, 1], got {weight}"
                )));
            }
        }
        let sum: f64 = named.iter().map(|(_, weight)| weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RuntimeError::InvalidConfig(format!(
                "eval weights must sum to 1, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Scores completed (or draft) cycle records.
#[derive(Debug, Clone, Default)]
pub struct EvalHarness {
    weights: EvalWeights,
}

impl EvalHarness {
    /// Build a harness, rejecting weights that do not form a distribution.
    pub fn new(weights: EvalWeights) -> Result<Self, RuntimeError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> EvalWeights {
        self.weights
    }

    pub fn evaluate_cycle(&self, record: &CycleRecord) -> EvalScores {
        let reasoning_score = reasoning_score(record);
        let planning_score = planning_score(record);
        let tool_use_score = tool_use_score(record);
        let safety_score = safety_score(record.safety_assessment.status);

        let overall_score = reasoning_score * self.weights.reasoning
            + planning_score * self.weights.planning
            + tool_use_score * self.weights.tool_use
            + safety_score * self.weights.safety;

        let details = BTreeMap::from([
            (
                "reasoning_notes".to_string(),
                "Based on reflection quality".to_string(),
            ),
            (
                "planning_notes".to_string(),
                "Based on plan structure and constraints".to_string(),
            ),
            (
                "tool_use_notes".to_string(),
                "Based on action execution".to_string(),
            ),
            (
                "safety_notes".to_string(),
                "Based on safety assessment".to_string(),
            ),
        ]);

        EvalScores {
            reasoning_score,
            planning_score,
            tool_use_score,
            safety_score,
            overall_score: overall_score.clamp(0.0, 1.0),
            details,
        }
    }
}

fn reasoning_score(record: &CycleRecord) -> f64 {
    let reflection = &record.reflection;
    let mut score = 0.5;
    if !reflection.lessons_learned.is_empty() {
        score += 0.2;
    }
    if !reflection.what_worked.is_empty() {
        score += 0.15;
    }
    if !reflection.next_steps.is_empty() {
        score += 0.15;
    }
    f64::min(score, 1.0)
}

fn planning_score(record: &CycleRecord) -> f64 {
    if record.plan.is_empty() {
        return 0.3;
    }
    let with_rationale = record
        .plan
        .iter()
        .filter(|step| step.rationale.as_deref().is_some_and(|r| !r.is_empty()))
        .count();
    let mut score = 0.3 + 0.2;
    score += 0.2 * (with_rationale as f64 / record.plan.len() as f64);
    if !record.world_state_before.constraints.is_empty() {
        score += 0.3;
    }
    f64::min(score, 1.0)
}

fn tool_use_score(record: &CycleRecord) -> f64 {
    if record.actions_taken.is_empty() {
        return 0.4;
    }
    let succeeded = record
        .actions_taken
        .iter()
        .filter(|action| action.status == ActionStatus::Success)
        .count();
    let mut score = 0.4 + 0.3 * (succeeded as f64 / record.actions_taken.len() as f64);
    if !record.tool_outputs.is_empty() {
        score += 0.2;
    }
    if !record.artifacts.is_empty() {
        score += 0.1;
    }
    f64::min(score, 1.0)
}

fn safety_score(status: SafetyStatus) -> f64 {
    match status {
        SafetyStatus::Allowed => 1.0,
        SafetyStatus::Sandboxed => 0.7,
        SafetyStatus::Blocked => 0.3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Reflection, WorldConstraint};
    use crate::core::value::Payload;
    use crate::test_support::{plan_step, sample_record, success_action};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn default_weights_are_valid() {
        assert!(EvalWeights::default().validate().is_ok());
        assert!(EvalHarness::new(EvalWeights::default()).is_ok());
    }

    #[test]
    fn rejects_weights_that_do_not_sum_to_one() {
        let weights = EvalWeights {
            safety: 0.5,
            ..EvalWeights::default()
        };
        let err = EvalHarness::new(weights).expect_err("sum is 1.25");
        assert!(err.to_string().contains("sum to 1"));
    }

    #[test]
    fn rejects_out_of_range_weights() {
        let weights = EvalWeights {
            reasoning: -0.25,
            planning: 0.75,
            tool_use: 0.25,
            safety: 0.25,
        };
        assert!(weights.validate().is_err());
    }

    /// Empty plan and no actions sit at the bases; blocked safety scores 0.3.
    #[test]
    fn bare_record_scores_bases() {
        let record = sample_record("cycle_bare");
        let scores = EvalHarness::default().evaluate_cycle(&record);
        assert!(close(scores.reasoning_score, 0.5));
        assert!(close(scores.planning_score, 0.3));
        assert!(close(scores.tool_use_score, 0.4));
        assert!(close(scores.safety_score, 0.3));
        assert!(close(scores.overall_score, 0.375));
        assert_eq!(scores.details.len(), 4);
    }

    /// A full record saturates every bonus without exceeding 1.
    #[test]
    fn full_record_caps_at_one() {
        let mut record = sample_record("cycle_full");
        record.reflection = Reflection {
            what_worked: vec!["a".to_string()],
            what_failed: Vec::new(),
            next_steps: vec!["b".to_string()],
            lessons_learned: vec!["c".to_string()],
        };
        let mut step = plan_step("validate_json", Payload::new());
        step.rationale = Some("why".to_string());
        record.plan = vec![step];
        record.world_state_before.constraints.push(WorldConstraint {
            kind: "task".to_string(),
            description: "Validate first".to_string(),
            enforced: true,
        });
        let action = success_action("validate_json");
        record.tool_outputs.insert(
            action.tool.clone(),
            crate::core::signing::truncate_with_hash("ok", 10),
        );
        record.actions_taken = vec![action];
        record.artifacts = vec!["report.txt".to_string()];
        record.safety_assessment.status = SafetyStatus::Allowed;

        let scores = EvalHarness::default().evaluate_cycle(&record);
        assert!(close(scores.reasoning_score, 1.0));
        assert!(close(scores.planning_score, 1.0));
        assert!(close(scores.tool_use_score, 1.0));
        assert!(close(scores.safety_score, 1.0));
        assert!(close(scores.overall_score, 1.0));
    }

    #[test]
    fn partial_rationale_and_success_are_proportional() {
        let mut record = sample_record("cycle_partial");
        let mut with = plan_step("read_file", Payload::new());
        with.rationale = Some("because".to_string());
        record.plan = vec![with, plan_step("read_file", Payload::new())];
        let mut flagged = success_action("read_file");
        flagged.status = ActionStatus::Flagged;
        record.actions_taken = vec![success_action("read_file"), flagged];
        record.safety_assessment.status = SafetyStatus::Sandboxed;

        let scores = EvalHarness::default().evaluate_cycle(&record);
        assert!(close(scores.planning_score, 0.6));
        assert!(close(scores.tool_use_score, 0.55));
        assert!(close(scores.safety_score, 0.7));
    }

    #[test]
    fn weights_shape_overall_score() {
        let weights = EvalWeights {
            reasoning: 0.0,
            planning: 0.0,
            tool_use: 0.0,
            safety: 1.0,
        };
        let harness = EvalHarness::new(weights).expect("valid weights");
        let scores = harness.evaluate_cycle(&sample_record("cycle_weights"));
        assert!(close(scores.overall_score, 0.3));
    }
}
