// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::Parser;

pub use crate::types::LogLevel;

/// Command-line arguments for `simexec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "simexec",
    version,
    about = "Run a long-lived command as a monitored local process.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Optional: without it the built-in service defaults are used.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory the command runs in (overrides `[process].run_dir`).
    #[arg(long, value_name = "DIR")]
    pub run_dir: Option<PathBuf>,

    /// File receiving merged stdout+stderr (overrides `[process].output_file`).
    #[arg(long, value_name = "PATH")]
    pub output_file: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SIMEXEC_LOG` or the config file's level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved configuration, but don't run.
    #[arg(long)]
    pub dry_run: bool,

    /// The command to run, tokenized by whitespace (no shell).
    ///
    /// Falls back to `[process].command` from the config file.
    #[arg(trailing_var_arg = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl CliArgs {
    /// The command given on the command line, if any.
    pub fn command_line(&self) -> Option<String> {
        if self.command.is_empty() {
            None
        } else {
            Some(self.command.join(" "))
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
