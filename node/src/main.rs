// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Margin Node
//!
//! Entry point for the `margin-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and replays a scenario against a fresh
//! settlement system.
//!
//! The binary supports two subcommands:
//!
//! - `run`: replay a scenario file and print the report
//! - `version`: print build version information

mod cli;
mod logging;
mod metrics;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Commands, MarginNodeCli};
use metrics::NodeMetrics;
use scenario::{Scenario, ScenarioRunner};

fn main() -> Result<()> {
    let cli = MarginNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_scenario(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Loads the scenario, replays it and prints the report (and metrics).
///
/// Failed steps do not make the process fail; only a scenario that cannot
/// be loaded does.
fn run_scenario(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(&args.log_level, args.log_format);

    let scenario = Scenario::load(&args.scenario)?;
    let config = scenario.config.clone().unwrap_or_default();
    tracing::info!(
        scenario = %args.scenario.display(),
        steps = scenario.steps.len(),
        max_path_length = config.max_path_length,
        "starting margin-node"
    );

    let metrics = NodeMetrics::new().context("failed to create metrics registry")?;
    let mut runner = ScenarioRunner::new(config, metrics.clone());
    let report = runner.run(&scenario);

    if args.json {
        let body = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        println!("{body}");
    } else {
        if let Some(name) = &report.name {
            println!("scenario: {name}");
        }
        for step in &report.steps {
            println!("{step}");
        }
        println!(
            "{} step(s), {} failed, {} event(s) recorded",
            report.steps.len(),
            report.failures(),
            report.events_recorded
        );
    }

    if args.metrics {
        let text = metrics.encode().context("failed to encode metrics")?;
        print!("{text}");
    }

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("margin-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", margin_protocol::config::PROTOCOL_VERSION);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
