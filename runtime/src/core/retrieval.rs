//! Memory hits and deterministic relevance ranking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::MemoryType;
use crate::core::value::{Payload, Value};

const KEYWORD_WEIGHT: f64 = 0.5;
const RECENCY_WEIGHT: f64 = 0.3;
const RECENCY_WINDOW_DAYS: f64 = 30.0;
const PROCEDURAL_BONUS: f64 = 0.2;
const SEMANTIC_BONUS: f64 = 0.1;

/// One search result as returned by a memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Payload,
}

/// A retrieved memory, normalized for ranking and for the observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub memory_id: String,
    pub content: String,
    /// Tier from the `memory_type` tag; `None` when untagged or unrecognized.
    pub memory_type: Option<MemoryType>,
    pub metadata: Payload,
    pub timestamp: Option<String>,
}

impl MemoryItem {
    pub fn from_hit(hit: MemoryHit) -> Self {
        let memory_type = hit
            .metadata
            .get("memory_type")
            .and_then(Value::as_str)
            .and_then(MemoryType::from_tag);
        let timestamp = hit
            .metadata
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            memory_id: hit.id,
            content: hit.content,
            memory_type,
            metadata: hit.metadata,
            timestamp,
        }
    }

    /// Map form embedded in a cycle observation.
    pub fn to_value(&self) -> Value {
        let mut map = Payload::new();
        map.insert("memory_id".to_string(), Value::from(self.memory_id.as_str()));
        map.insert("content".to_string(), Value::from(self.content.as_str()));
        map.insert("memory_type".to_string(), Value::from(self.memory_type.map_or("unknown", MemoryType::as_str)));
        map.insert("metadata".to_string(), Value::Map(self.metadata.clone()));
        if let Some(timestamp) = &self.timestamp {
            map.insert("timestamp".to_string(), Value::from(timestamp.as_str()));
        }
        Value::Map(map)
    }
}

/// Relevance of one memory to `goal` as of `now`.
///
/// Sums keyword overlap (0.5 per distinct goal word found in the content),
/// a recency bonus decaying linearly to zero over 30 days (up to 0.3), and a
/// type bonus (procedural 0.2, semantic 0.1). Unparsable timestamps earn no
/// recency bonus.
pub fn relevance_score(goal: &str, item: &MemoryItem, now: DateTime<Utc>) -> f64 {
    let content = item.content.to_lowercase();
    let goal = goal.to_lowercase();
    let mut keywords: Vec<&str> = goal.split_whitespace().collect();
    keywords.sort_unstable();
    keywords.dedup();
    let matches = keywords
        .iter()
        .filter(|keyword| content.contains(*keyword))
        .count();
    let mut score = matches as f64 * KEYWORD_WEIGHT;

    if let Some(at) = item
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    {
        let age_days = (now - at.with_timezone(&Utc)).num_days() as f64;
        let recency = (1.0 - age_days / RECENCY_WINDOW_DAYS).clamp(0.0, 1.0);
        score += recency * RECENCY_WEIGHT;
    }

    score += match item.memory_type {
        Some(MemoryType::Procedural) => PROCEDURAL_BONUS,
        Some(MemoryType::Semantic) => SEMANTIC_BONUS,
        Some(MemoryType::Episodic) | None => 0.0,
    };
    score
}

/// Top `k` memories by relevance. Ties keep their input order.
pub fn rank_memories(
    goal: &str,
    items: Vec<MemoryItem>,
    now: DateTime<Utc>,
    k: usize,
) -> Vec<MemoryItem> {
    let mut scored: Vec<(f64, MemoryItem)> = items
        .into_iter()
        .map(|item| (relevance_score(goal, &item, now), item))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(k).map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::payload;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time")
    }

    fn item(id: &str, content: &str, kind: &str, timestamp: Option<&str>) -> MemoryItem {
        MemoryItem {
            memory_id: id.to_string(),
            content: content.to_string(),
            memory_type: MemoryType::from_tag(kind),
            metadata: Payload::new(),
            timestamp: timestamp.map(str::to_string),
        }
    }

    #[test]
    fn from_hit_reads_type_and_timestamp() {
        let hit = MemoryHit {
            id: "m1".to_string(),
            content: "fact".to_string(),
            metadata: payload(json!({"memory_type": "semantic", "timestamp": "2026-02-01T00:00:00Z"})),
        };
        let item = MemoryItem::from_hit(hit);
        assert_eq!(item.memory_type, Some(MemoryType::Semantic));
        assert_eq!(item.timestamp.as_deref(), Some("2026-02-01T00:00:00Z"));

        let bare = MemoryItem::from_hit(MemoryHit {
            id: "m2".to_string(),
            content: String::new(),
            metadata: Payload::new(),
        });
        assert_eq!(bare.memory_type, None);
        assert_eq!(bare.timestamp, None);
        let value = bare.to_value();
        assert_eq!(value.as_map().expect("map")["memory_type"], Value::from("unknown"));
    }

    #[test]
    fn score_combines_keywords_recency_and_type() {
        let fresh = item("a", "validate the data", "procedural", Some("2026-03-01T00:00:00Z"));
        let score = relevance_score("validate data data", &fresh, now());
        assert!((score - (1.0 + 0.3 + 0.2)).abs() < 1e-9);

        let old = item("b", "unrelated", "episodic", Some("2025-01-01T00:00:00Z"));
        assert!(relevance_score("validate", &old, now()).abs() < 1e-9);

        let halfway = item("c", "", "semantic", Some("2026-02-14T12:00:00Z"));
        assert!((relevance_score("x", &halfway, now()) - (0.5 * 0.3 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn unrecognized_tag_earns_no_type_bonus() {
        let odd = item("d", "", "skillset", None);
        assert_eq!(odd.memory_type, None);
        assert!(relevance_score("x", &odd, now()).abs() < 1e-9);
    }

    /// Higher scores come first and equal scores keep input order.
    #[test]
    fn ranking_is_stable_and_bounded() {
        let items = vec![
            item("plain-1", "nothing", "episodic", None),
            item("match", "validate", "episodic", None),
            item("plain-2", "nothing", "episodic", None),
            item("skill", "nothing", "procedural", None),
        ];
        let ranked = rank_memories("validate", items, now(), 3);
        let ids: Vec<&str> = ranked.iter().map(|m| m.memory_id.as_str()).collect();
        assert_eq!(ids, vec!["match", "skill", "plain-1"]);
    }
}
