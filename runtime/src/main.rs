//! Auditable agent cycle runtime.
//!
//! Runs one observe-to-evolve cycle per invocation and appends its
//! hash-chained record to `<log_dir>/<YYYY-MM-DD>/cycles.jsonl`. `verify`
//! audits the whole log after the fact.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use runtime::core::safety::Environment;
use runtime::core::value::{Payload, payload_from_json};
use runtime::cycle::Orchestrator;
use runtime::error::RuntimeError;
use runtime::exit_codes;
use runtime::io::config::{DEFAULT_CONFIG_PATH, RuntimeConfig, load_config, write_config};
use runtime::io::persistence::CycleLog;
use runtime::logging;
use runtime::verify::verify_log;

#[derive(Parser)]
#[command(name = "runtime", version, about = "Auditable single-agent cycle runtime")]
struct Cli {
    /// Config file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Override the configured environment (production, staging, development).
    #[arg(long, global = true)]
    env: Option<Environment>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the effective config (defaults plus overrides) to `--config`.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run one cycle and print its id, hash, status and score.
    Run {
        #[arg(long)]
        goal: String,

        /// Input data as a JSON object.
        #[arg(long)]
        input: Option<String>,
    },
    /// Audit every record against the schema and the hash chain.
    Verify,
    /// Print the most recent record as pretty JSON.
    Latest,
    /// List a cycle's artifacts, or print one with `--name`.
    Artifacts {
        cycle_id: String,

        /// Partition date (YYYY-MM-DD); defaults to today (UTC).
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        name: Option<String>,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RuntimeError>() {
        Some(RuntimeError::IntegrityViolation { .. }) => exit_codes::INTEGRITY,
        _ => exit_codes::INVALID,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, &config, force),
        Command::Run { goal, input } => cmd_run(config, &goal, input.as_deref()),
        Command::Verify => cmd_verify(&config),
        Command::Latest => cmd_latest(&config),
        Command::Artifacts {
            cycle_id,
            date,
            name,
        } => cmd_artifacts(&config, &cycle_id, date.as_deref(), name.as_deref()),
    }
}

fn resolve_config(cli: &Cli) -> Result<RuntimeConfig> {
    let mut config = load_config(&cli.config)?;
    if let Some(log_dir) = &cli.log_dir {
        config.log_dir.clone_from(log_dir);
    }
    if let Some(env) = cli.env {
        config.environment = env;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_init(path: &Path, config: &RuntimeConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("exists: {}", path.display());
        return Ok(());
    }
    write_config(path, config)?;
    println!("wrote: {}", path.display());
    Ok(())
}

fn cmd_run(config: RuntimeConfig, goal: &str, input: Option<&str>) -> Result<()> {
    let input = parse_input(input)?;
    let mut orchestrator = Orchestrator::new(config)?;
    let record = orchestrator.run_cycle(goal, &input);
    if orchestrator.state().last_hash.as_deref() != Some(record.hash.as_str()) {
        return Err(RuntimeError::Storage(format!(
            "cycle {} was not persisted",
            record.cycle_id
        ))
        .into());
    }
    println!(
        "{} {} {} {:.4}",
        record.cycle_id,
        record.hash,
        record.safety_assessment.status.as_str(),
        record.eval_scores.overall_score
    );
    Ok(())
}

fn parse_input(input: Option<&str>) -> Result<Payload> {
    let Some(raw) = input else {
        return Ok(Payload::new());
    };
    let json: serde_json::Value = serde_json::from_str(raw).context("parse --input json")?;
    payload_from_json(json).context("convert --input")
}

fn cmd_verify(config: &RuntimeConfig) -> Result<()> {
    let audit = verify_log(&CycleLog::new(&config.log_dir))?.into_result()?;
    println!("ok: {} records", audit.records);
    Ok(())
}

fn cmd_latest(config: &RuntimeConfig) -> Result<()> {
    let log = CycleLog::new(&config.log_dir)
        .with_lookback_days(config.persistence.latest_lookback_days);
    match log.get_latest_cycle()? {
        Some(record) => {
            let json = serde_json::to_string_pretty(&record).context("serialize record")?;
            println!("{json}");
        }
        None => println!("no cycles"),
    }
    Ok(())
}

fn cmd_artifacts(
    config: &RuntimeConfig,
    cycle_id: &str,
    date: Option<&str>,
    name: Option<&str>,
) -> Result<()> {
    let log = CycleLog::new(&config.log_dir);
    if let Some(name) = name {
        let bytes = log
            .read_artifact(cycle_id, name, date)?
            .with_context(|| format!("artifact {name} not found for {cycle_id}"))?;
        std::io::stdout()
            .write_all(&bytes)
            .context("write artifact to stdout")?;
        return Ok(());
    }
    for artifact in log.list_artifacts(cycle_id, date)? {
        println!("{artifact}");
    }
    Ok(())
}
