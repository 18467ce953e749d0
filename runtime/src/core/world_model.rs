//! Belief-state snapshots and their update rules.
//!
//! Every function here takes a snapshot by reference and returns a new one;
//! nothing mutates a snapshot that has already been handed out.

use crate::core::types::{
    ActionResult, ActionStatus, Reflection, WorldConstraint, WorldEntity, WorldEvent,
    WorldHypothesis, WorldModel, WorldRelation,
};
use crate::core::value::{Payload, Value};

pub const UPDATE_EVENT: &str = "world_model_update";
pub const EMPTY_SUMMARY: &str = "World model is empty";
pub const HYPOTHESIS_CONFIDENCE: f64 = 0.8;

const VALIDATION_KEYWORD: &str = "validation";
const SUMMARY_CONSTRAINTS: usize = 5;
const SUMMARY_HYPOTHESES: usize = 3;
const SUMMARY_MIN_CONFIDENCE: f64 = 0.7;

/// Fold one cycle's observation, action outcomes and reflection into a new snapshot.
///
/// Appends exactly one timeline event, then:
/// - adds a `task` entity for the observation's `task_type` unless present;
/// - adds a `task` constraint for each lesson mentioning validation, deduplicated
///   by description;
/// - appends one hypothesis per successful action (never deduplicated).
pub fn update_world_model(
    current: &WorldModel,
    observation: &Payload,
    actions: &[ActionResult],
    reflection: &Reflection,
    at: &str,
) -> WorldModel {
    let mut next = current.clone();

    next.timeline.push(WorldEvent {
        timestamp: at.to_string(),
        event: UPDATE_EVENT.to_string(),
        refs: Vec::new(),
    });

    if let Some(task_type) = observation.get("task_type") {
        let id = format!("task_{}", task_type.to_text());
        if !next.entities.iter().any(|entity| entity.id == id) {
            let mut attributes = Payload::new();
            attributes.insert("task_type".to_string(), task_type.clone());
            attributes.insert("observed_at".to_string(), Value::from(at));
            next.entities.push(WorldEntity {
                id,
                kind: "task".to_string(),
                attributes,
            });
        }
    }

    for lesson in &reflection.lessons_learned {
        if lesson.to_lowercase().contains(VALIDATION_KEYWORD)
            && !next
                .constraints
                .iter()
                .any(|constraint| &constraint.description == lesson)
        {
            next.constraints.push(WorldConstraint {
                kind: "task".to_string(),
                description: lesson.clone(),
                enforced: true,
            });
        }
    }

    for action in actions {
        if action.status == ActionStatus::Success {
            next.hypotheses.push(WorldHypothesis {
                claim: format!("Tool {} is effective for this task type", action.tool),
                confidence: HYPOTHESIS_CONFIDENCE,
                evidence_refs: vec![action.tool.clone()],
            });
        }
    }

    next
}

/// Bounded, human-readable digest of a snapshot.
pub fn summarize_world_model(model: &WorldModel) -> String {
    let mut parts = Vec::new();

    if !model.entities.is_empty() {
        let mut by_kind: Vec<(&str, usize)> = Vec::new();
        for entity in &model.entities {
            match by_kind.iter_mut().find(|(kind, _)| *kind == entity.kind) {
                Some((_, count)) => *count += 1,
                None => by_kind.push((entity.kind.as_str(), 1)),
            }
        }
        let grouped: Vec<String> = by_kind
            .iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect();
        parts.push(format!(
            "Entities ({}): {}",
            model.entities.len(),
            grouped.join(", ")
        ));
    }

    if !model.relations.is_empty() {
        parts.push(format!("Relations: {} connections", model.relations.len()));
    }

    if !model.constraints.is_empty() {
        let start = model.constraints.len().saturating_sub(SUMMARY_CONSTRAINTS);
        let mut section = String::from("Active Constraints:");
        for constraint in &model.constraints[start..] {
            section.push_str(&format!(
                "\n  - [{}] {}",
                constraint.kind, constraint.description
            ));
        }
        parts.push(section);
    }

    let confident: Vec<&WorldHypothesis> = model
        .hypotheses
        .iter()
        .filter(|hypothesis| hypothesis.confidence > SUMMARY_MIN_CONFIDENCE)
        .collect();
    if !confident.is_empty() {
        let start = confident.len().saturating_sub(SUMMARY_HYPOTHESES);
        let mut section = format!("High-confidence hypotheses ({}):", confident.len());
        for hypothesis in &confident[start..] {
            section.push_str(&format!(
                "\n  - {} (confidence: {:.2})",
                hypothesis.claim, hypothesis.confidence
            ));
        }
        parts.push(section);
    }

    if !model.timeline.is_empty() {
        parts.push(format!("Timeline events: {}", model.timeline.len()));
    }

    if parts.is_empty() {
        EMPTY_SUMMARY.to_string()
    } else {
        parts.join("\n")
    }
}

/// Insert an entity, or update the one with the same id (attributes merge).
pub fn with_entity(model: &WorldModel, id: &str, kind: &str, attributes: Payload) -> WorldModel {
    let mut next = model.clone();
    match next.entities.iter_mut().find(|entity| entity.id == id) {
        Some(entity) => {
            entity.kind = kind.to_string();
            entity.attributes.extend(attributes);
        }
        None => next.entities.push(WorldEntity {
            id: id.to_string(),
            kind: kind.to_string(),
            attributes,
        }),
    }
    next
}

pub fn with_relation(
    model: &WorldModel,
    from_id: &str,
    to_id: &str,
    kind: &str,
    metadata: Payload,
) -> WorldModel {
    let mut next = model.clone();
    next.relations.push(WorldRelation {
        from_id: from_id.to_string(),
        to_id: to_id.to_string(),
        kind: kind.to_string(),
        metadata,
    });
    next
}

/// Add a constraint unless one with the same description exists.
pub fn with_constraint(
    model: &WorldModel,
    kind: &str,
    description: &str,
    enforced: bool,
) -> WorldModel {
    let mut next = model.clone();
    if !next
        .constraints
        .iter()
        .any(|constraint| constraint.description == description)
    {
        next.constraints.push(WorldConstraint {
            kind: kind.to_string(),
            description: description.to_string(),
            enforced,
        });
    }
    next
}

/// Constraints that mention `task` (case-insensitive) or are task-typed.
pub fn relevant_constraints<'a>(model: &'a WorldModel, task: &str) -> Vec<&'a WorldConstraint> {
    let needle = task.to_lowercase();
    model
        .constraints
        .iter()
        .filter(|constraint| {
            constraint.kind == "task" || constraint.description.to_lowercase().contains(&needle)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{payload, success_action};
    use serde_json::json;

    const AT: &str = "2026-01-15T10:00:00.000000Z";

    fn lessons(items: &[&str]) -> Reflection {
        Reflection {
            lessons_learned: items.iter().map(|item| (*item).to_string()).collect(),
            ..Reflection::default()
        }
    }

    /// The input snapshot is untouched and exactly one event is appended.
    #[test]
    fn update_returns_new_snapshot() {
        let current = WorldModel::default();
        let next = update_world_model(&current, &Payload::new(), &[], &Reflection::default(), AT);
        assert_eq!(current, WorldModel::default());
        assert_eq!(next.timeline.len(), 1);
        assert_eq!(next.timeline[0].event, UPDATE_EVENT);
        assert_eq!(next.timeline[0].timestamp, AT);
    }

    #[test]
    fn task_entity_added_once() {
        let observation = payload(json!({"task_type": "validation"}));
        let first = update_world_model(
            &WorldModel::default(),
            &observation,
            &[],
            &Reflection::default(),
            AT,
        );
        let second = update_world_model(&first, &observation, &[], &Reflection::default(), AT);
        assert_eq!(second.entities.len(), 1);
        assert_eq!(second.entities[0].id, "task_validation");
        assert_eq!(second.entities[0].kind, "task");
        assert_eq!(second.timeline.len(), 2);
    }

    #[test]
    fn validation_lessons_become_constraints_without_duplicates() {
        let reflection = lessons(&[
            "Validation must precede processing",
            "Be concise",
            "Validation must precede processing",
        ]);
        let next = update_world_model(&WorldModel::default(), &Payload::new(), &[], &reflection, AT);
        assert_eq!(next.constraints.len(), 1);
        assert_eq!(next.constraints[0].kind, "task");
        assert!(next.constraints[0].enforced);

        let again = update_world_model(&next, &Payload::new(), &[], &reflection, AT);
        assert_eq!(again.constraints.len(), 1);
    }

    /// Hypotheses accumulate per success and are never deduplicated.
    #[test]
    fn successful_actions_add_hypotheses() {
        let actions = vec![success_action("validate_json"), success_action("validate_json")];
        let next = update_world_model(
            &WorldModel::default(),
            &Payload::new(),
            &actions,
            &Reflection::default(),
            AT,
        );
        assert_eq!(next.hypotheses.len(), 2);
        assert_eq!(
            next.hypotheses[0].claim,
            "Tool validate_json is effective for this task type"
        );
        assert_eq!(next.hypotheses[0].evidence_refs, vec!["validate_json".to_string()]);
        assert!((next.hypotheses[0].confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn flagged_actions_add_no_hypotheses() {
        let mut action = success_action("read_file");
        action.status = ActionStatus::Flagged;
        let next = update_world_model(
            &WorldModel::default(),
            &Payload::new(),
            &[action],
            &Reflection::default(),
            AT,
        );
        assert!(next.hypotheses.is_empty());
    }

    #[test]
    fn empty_model_summary_is_sentinel() {
        assert_eq!(summarize_world_model(&WorldModel::default()), EMPTY_SUMMARY);
    }

    /// Summary groups entities by type and bounds constraints and hypotheses.
    #[test]
    fn summary_is_bounded() {
        let mut model = WorldModel::default();
        model = with_entity(&model, "a", "task", Payload::new());
        model = with_entity(&model, "b", "file", Payload::new());
        model = with_entity(&model, "c", "task", Payload::new());
        model = with_relation(&model, "a", "b", "reads", Payload::new());
        for i in 0..7 {
            model = with_constraint(&model, "task", &format!("rule {i}"), true);
        }
        for i in 0..5 {
            model.hypotheses.push(WorldHypothesis {
                claim: format!("claim {i}"),
                confidence: 0.9,
                evidence_refs: Vec::new(),
            });
        }
        model.hypotheses.push(WorldHypothesis {
            claim: "weak".to_string(),
            confidence: 0.5,
            evidence_refs: Vec::new(),
        });

        let summary = summarize_world_model(&model);
        assert!(summary.starts_with("Entities (3): 2 task, 1 file"));
        assert!(summary.contains("Relations: 1 connections"));
        assert!(!summary.contains("rule 1"));
        assert!(summary.contains("  - [task] rule 2"));
        assert!(summary.contains("  - [task] rule 6"));
        assert!(summary.contains("High-confidence hypotheses (5):"));
        assert!(!summary.contains("claim 1 "));
        assert!(summary.contains("claim 4 (confidence: 0.90)"));
        assert!(!summary.contains("weak"));
        assert!(!summary.contains("Timeline"));
    }

    #[test]
    fn with_entity_merges_attributes_without_touching_input() {
        let base = with_entity(
            &WorldModel::default(),
            "db",
            "store",
            payload(json!({"engine": "sqlite"})),
        );
        let merged = with_entity(&base, "db", "database", payload(json!({"size": 3})));
        assert_eq!(base.entities[0].kind, "store");
        assert_eq!(base.entities[0].attributes.len(), 1);
        assert_eq!(merged.entities.len(), 1);
        assert_eq!(merged.entities[0].kind, "database");
        assert_eq!(merged.entities[0].attributes.len(), 2);
    }

    #[test]
    fn relevant_constraints_match_task_or_type() {
        let mut model = with_constraint(&WorldModel::default(), "safety", "Never touch Billing", true);
        model = with_constraint(&model, "environment", "Read-only disk", true);
        model = with_constraint(&model, "task", "Validate first", true);
        let relevant: Vec<&str> = relevant_constraints(&model, "billing")
            .into_iter()
            .map(|constraint| constraint.description.as_str())
            .collect();
        assert_eq!(relevant, vec!["Never touch Billing", "Validate first"]);
    }
}
