//! # CLI Interface
//!
//! Defines the command-line argument structure for `margin-node` using
//! `clap` derive. Supports two subcommands: `run` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Isolation-mode margin settlement simulator.
///
/// Replays a JSON scenario of vault, deposit and swap steps against a fresh
/// settlement system and reports the outcome of every step.
#[derive(Parser, Debug)]
#[command(
    name = "margin-node",
    about = "Isolation-mode margin settlement simulator",
    version,
    propagate_version = true
)]
pub struct MarginNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the margin node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scenario file.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the scenario file (JSON).
    #[arg(long, short = 's', env = "MARGIN_SCENARIO")]
    pub scenario: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, env = "MARGIN_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "MARGIN_LOG_LEVEL", default_value = "margin_node=info,margin_contracts=info")]
    pub log_level: String,

    /// Print the Prometheus metrics after the run.
    #[arg(long, env = "MARGIN_METRICS")]
    pub metrics: bool,

    /// Print the report as JSON instead of one line per step.
    #[arg(long)]
    pub json: bool,
}
