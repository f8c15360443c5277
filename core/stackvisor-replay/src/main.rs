//! stackvisor-replay: runs a recorded scheduler script against a fresh supervisor.
//!
//! Every collaborator call is logged, `expect_state` steps are checked as they
//! run, and invariants are verified after each step. The process exits with
//! status 1 on a script error, a failed expectation, or any invariant violation.
//!
//! ## Usage
//!
//! ```text
//! stackvisor-replay session.json --dump
//! STACKVISOR_DEBUG_LOG=1 stackvisor-replay session.json --config ./stackvisor.toml
//! ```

mod runner;
mod services;

use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;
use stackvisor_core::load_config;
use stackvisor_protocol::{parse_script, Script};
use tracing_subscriber::EnvFilter;

use crate::runner::{ReplayReport, Replayer};

#[derive(Parser)]
#[command(name = "stackvisor-replay")]
#[command(about = "Replay a scripted activity scheduler session")]
#[command(version)]
struct Cli {
    /// Path to the JSON script
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    /// Scheduler config file (defaults to ~/.stackvisor/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the final hierarchy snapshot as JSON
    #[arg(long)]
    dump: bool,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(report) if report.invariant_violations.is_empty() => {
            tracing::info!(
                steps = report.steps,
                delivered = report.delivered,
                process_starts = report.process_starts,
                "Replay finished"
            );
        }
        Ok(report) => {
            tracing::error!(
                violations = report.invariant_violations.len(),
                "Replay finished with invariant violations"
            );
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "stackvisor-replay failed");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<ReplayReport, Box<dyn std::error::Error>> {
    let config = load_config(cli.config.clone())?;
    let script = load_script(&cli.script)?;
    if let Some(description) = &script.description {
        tracing::info!(script = %cli.script.display(), description = %description, "Loaded script");
    }

    let report = Replayer::new(config).run(&script)?;
    for snapshot in &report.dumps {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    }
    if cli.dump {
        println!("{}", serde_json::to_string_pretty(&report.final_snapshot)?);
    }
    Ok(report)
}

fn load_script(path: &Path) -> Result<Script, Box<dyn std::error::Error>> {
    let text = fs_err::read_to_string(path)?;
    Ok(parse_script(&text)?)
}

fn init_logging() {
    let debug_enabled = env::var("STACKVISOR_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
