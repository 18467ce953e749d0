//! Rule-based reflection over a cycle's outcome.

use crate::core::types::{ActionResult, ActionStatus, EvalScores, Reflection, SafetyAssessment, SafetyStatus};

/// Overall score at or above which a cycle counts as high quality.
pub const HIGH_QUALITY_SCORE: f64 = 0.7;

/// Reflection seeded before scoring: only records whether anything ran.
pub fn preliminary_reflection(actions: &[ActionResult]) -> Reflection {
    if actions.is_empty() {
        Reflection {
            what_failed: vec!["No actions taken".to_string()],
            ..Reflection::default()
        }
    } else {
        Reflection {
            what_worked: vec!["Cycle completed".to_string()],
            ..Reflection::default()
        }
    }
}

/// Derive what worked, what failed, next steps and lessons from a cycle.
pub fn reflect(
    actions: &[ActionResult],
    safety: &SafetyAssessment,
    scores: &EvalScores,
) -> Reflection {
    let mut reflection = Reflection::default();

    if actions.is_empty() {
        reflection
            .what_failed
            .push("No actions were executed".to_string());
    } else {
        let succeeded = actions
            .iter()
            .filter(|action| action.status == ActionStatus::Success)
            .count();
        reflection.what_worked.push(format!(
            "{succeeded}/{} actions completed successfully",
            actions.len()
        ));
        let flagged = actions.len() - succeeded;
        if flagged > 0 {
            reflection
                .what_failed
                .push(format!("{flagged} action output(s) flagged by tripwires"));
        }
    }

    match safety.status {
        SafetyStatus::Blocked => {
            reflection.what_failed.push(format!(
                "Safety gate blocked plan: {}",
                safety.reasons.join("; ")
            ));
            reflection
                .lessons_learned
                .push("Need to improve plan safety".to_string());
        }
        SafetyStatus::Sandboxed => {
            reflection
                .next_steps
                .push("Rehearse risky steps in sandbox before execution".to_string());
        }
        SafetyStatus::Allowed => {
            reflection
                .what_worked
                .push("Plan passed safety checks".to_string());
        }
    }

    if scores.overall_score >= HIGH_QUALITY_SCORE {
        reflection.what_worked.push(format!(
            "High quality cycle (score: {:.2})",
            scores.overall_score
        ));
    } else {
        reflection.what_failed.push(format!(
            "Low quality cycle (score: {:.2})",
            scores.overall_score
        ));
        reflection
            .lessons_learned
            .push("Need to improve cycle quality".to_string());
    }

    if !reflection.what_failed.is_empty() {
        reflection
            .next_steps
            .push("Review and address failures".to_string());
    }
    reflection
        .next_steps
        .push("Continue with next goal".to_string());

    reflection
}

/// Reflection attached to a cycle that failed with `message`.
pub fn failure_reflection(message: &str) -> Reflection {
    Reflection {
        what_worked: Vec::new(),
        what_failed: vec![message.to_string()],
        next_steps: vec!["Debug and retry".to_string()],
        lessons_learned: vec!["Cycle execution failed".to_string()],
    }
}
