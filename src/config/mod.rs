// src/config/mod.rs

//! Configuration loading and validation for simexec.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants like non-negative delays (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, ProcessSection, RawConfigFile, RawServiceConfig, ServiceConfiguration};
pub use validate::validate_config;
