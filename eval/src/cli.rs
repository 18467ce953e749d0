//! CLI command implementations.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use runtime::core::signing::ChainReport;
use runtime::core::smoke::run_smoke_suite;
use runtime::io::persistence::CycleLog;

use crate::report::aggregate;

/// Run the smoke suite. Returns whether every scenario passed.
pub fn smoke(json: bool) -> Result<bool> {
    let report = run_smoke_suite();
    info!(passed = report.overall_passed, "smoke suite finished");
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.overall_passed);
    }
    for test in &report.tests {
        let verdict = if test.passed { "pass" } else { "FAIL" };
        println!("smoke: {} {} ({})", test.name, verdict, test.message);
    }
    println!("smoke: {}", report.summary);
    Ok(report.overall_passed)
}

/// Print aggregates for a log directory.
pub fn report(log_dir: &Path, date: Option<&str>, evolve_threshold: f64) -> Result<()> {
    let (summary, warnings) = aggregate(&CycleLog::new(log_dir), date, evolve_threshold)?;
    println!(
        "report: log={} cycles={}",
        log_dir.display(),
        summary.cycles
    );
    println!(
        "report: allowed={} sandboxed={} blocked={} failed={}",
        summary.allowed, summary.sandboxed, summary.blocked, summary.failed
    );
    if let Some(avg) = summary.avg_scores {
        println!(
            "report: avg reasoning={:.3} planning={:.3} tool_use={:.3} safety={:.3} overall={:.3}",
            avg.reasoning, avg.planning, avg.tool_use, avg.safety, avg.overall
        );
    }
    println!("report: evolve_eligible={}", summary.evolve_eligible);
    match summary.chain {
        Some(ChainReport::Valid { records }) => println!("report: chain=valid records={records}"),
        Some(ChainReport::Broken {
            index,
            cycle_id,
            reason,
        }) => println!("report: chain=broken index={index} cycle={cycle_id} ({reason})"),
        None => println!("report: chain=unchecked (single date)"),
    }
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}
