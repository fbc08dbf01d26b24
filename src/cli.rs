// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::loader::default_manifest_path;

/// Command-line arguments for `devgraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devgraph",
    version,
    about = "Build, finalize and run a device task graph described by a TOML manifest.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the graph manifest (TOML).
    ///
    /// Default: `Devgraph.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_manifest_path())]
    pub manifest: PathBuf,

    /// Number of times to submit the finalized graph. Overrides
    /// `[config].repeat`.
    #[arg(long, value_name = "N")]
    pub repeat: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate and finalize, print the schedule, but don't execute anything.
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

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
