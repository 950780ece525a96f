// src/errors.rs

//! Crate-wide error type and aliases.
//!
//! Library operations return [`SimexecError`]. Service hook bodies are user
//! code and return `anyhow::Result` (see [`crate::service::HookResult`]).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimexecError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Output file error for {path:?}: {source}")]
    OutputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn process '{command}': {source}")]
    SpawnError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Already started: {0}")]
    AlreadyStarted(String),

    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

pub type Result<T> = std::result::Result<T, SimexecError>;
