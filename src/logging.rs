// src/logging.rs

//! Logging setup for `simexec` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `SIMEXEC_LOG` environment variable (e.g. "info", "debug")
//! 3. `log_level` from the `[service]` config section (defaults to `info`)
//!
//! Logs are sent to STDERR; STDOUT is reserved for `updates()` streaming and
//! dry-run output.

use anyhow::Result;
use tracing_subscriber::fmt;

use crate::types::LogLevel;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, config_level: LogLevel) -> Result<()> {
    let level = resolve_level(
        cli_level,
        std::env::var("SIMEXEC_LOG").ok().as_deref(),
        config_level,
    );

    fmt()
        .with_max_level(level.as_tracing_level())
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Pick the effective level from the CLI flag, the env var value and the
/// configured level, in that order.
pub fn resolve_level(
    cli_level: Option<LogLevel>,
    env_value: Option<&str>,
    config_level: LogLevel,
) -> LogLevel {
    cli_level
        .or_else(|| env_value.and_then(|s| s.parse().ok()))
        .unwrap_or(config_level)
}
