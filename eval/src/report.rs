//! Aggregates over a persisted cycle log.

use anyhow::Result;
use tracing::debug;

use runtime::core::signing::{ChainReport, verify_chain};
use runtime::core::types::{CycleRecord, SafetyStatus};
use runtime::io::persistence::CycleLog;

/// Mean sub-scores across the aggregated cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AverageScores {
    pub reasoning: f64,
    pub planning: f64,
    pub tool_use: f64,
    pub safety: f64,
    pub overall: f64,
}

#[derive(Debug, Default, PartialEq)]
pub struct ReportSummary {
    pub cycles: usize,
    pub allowed: usize,
    pub sandboxed: usize,
    pub blocked: usize,
    /// Cycles closed by a failure record (subset of `blocked`).
    pub failed: usize,
    pub avg_scores: Option<AverageScores>,
    /// Cycles whose overall score would trigger an evolution.
    pub evolve_eligible: usize,
    /// Chain check over the whole log; `None` when restricted to one date.
    pub chain: Option<ChainReport>,
}

/// Summarize the whole log, or one partition when `date` is given.
///
/// Lines that do not parse are skipped with a warning.
pub fn aggregate(
    log: &CycleLog,
    date: Option<&str>,
    evolve_threshold: f64,
) -> Result<(ReportSummary, Vec<String>)> {
    let dates = match date {
        Some(date) => vec![date.to_string()],
        None => log.list_dates()?.into_iter().rev().collect(),
    };

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    for date in &dates {
        for (index, line) in log.raw_lines(date)?.iter().enumerate() {
            match serde_json::from_str::<CycleRecord>(line) {
                Ok(record) => records.push(record),
                Err(err) => warnings.push(format!("skip {date} line {}: {err}", index + 1)),
            }
        }
    }
    debug!(cycles = records.len(), dates = dates.len(), "records loaded");

    let mut summary = summarize(&records, evolve_threshold);
    if date.is_none() {
        summary.chain = Some(verify_chain(&records)?);
    }
    Ok((summary, warnings))
}

fn summarize(records: &[CycleRecord], evolve_threshold: f64) -> ReportSummary {
    let mut summary = ReportSummary {
        cycles: records.len(),
        ..ReportSummary::default()
    };
    let mut totals = AverageScores::default();

    for record in records {
        match record.safety_assessment.status {
            SafetyStatus::Allowed => summary.allowed += 1,
            SafetyStatus::Sandboxed => summary.sandboxed += 1,
            SafetyStatus::Blocked => summary.blocked += 1,
        }
        if record
            .safety_assessment
            .risk_flags
            .iter()
            .any(|flag| flag == "cycle_failure")
        {
            summary.failed += 1;
        }
        let scores = &record.eval_scores;
        if scores.overall_score > evolve_threshold {
            summary.evolve_eligible += 1;
        }
        totals.reasoning += scores.reasoning_score;
        totals.planning += scores.planning_score;
        totals.tool_use += scores.tool_use_score;
        totals.safety += scores.safety_score;
        totals.overall += scores.overall_score;
    }

    if !records.is_empty() {
        let n = records.len() as f64;
        summary.avg_scores = Some(AverageScores {
            reasoning: totals.reasoning / n,
            planning: totals.planning / n,
            tool_use: totals.tool_use / n,
            safety: totals.safety / n,
            overall: totals.overall / n,
        });
    }
    summary
}
