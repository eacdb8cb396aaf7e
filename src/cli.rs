// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::PolicyKind;

/// Command-line arguments for `taskgrid`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskgrid",
    version,
    about = "Dispatch a dependency-ordered workload over a pool of workers.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Taskgrid.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Taskgrid.toml")]
    pub config: String,

    /// Override `[scheduler].policy` (fifo or lifo).
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<PolicyKind>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKGRID_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the workload and the pool, run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
