mod cli;
mod report;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use runtime::core::version::DEFAULT_EVOLVE_THRESHOLD;

#[derive(Parser)]
#[command(name = "eval", version, about = "Evaluation harness for the cycle runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the fixed smoke suite; exits 1 if any scenario fails.
    Smoke {
        #[arg(long)]
        json: bool,
    },
    /// Aggregate scores and statuses over a persisted log.
    Report {
        #[arg(long, default_value = "runs/agi_runtime")]
        log_dir: PathBuf,

        /// Restrict to one partition (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,

        #[arg(long, default_value_t = DEFAULT_EVOLVE_THRESHOLD)]
        evolve_threshold: f64,
    },
}

fn main() -> Result<()> {
    runtime::logging::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Smoke { json } => {
            if !cli::smoke(json)? {
                std::process::exit(runtime::exit_codes::INVALID);
            }
            Ok(())
        }
        Command::Report {
            log_dir,
            date,
            evolve_threshold,
        } => cli::report(&log_dir, date.as_deref(), evolve_threshold),
    }
}
