// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::types::LogLevel;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [service]
/// as_service = true
/// loop_delay = 5
/// health_check_frequency = 10
/// health_check_log_threshold = 10
/// name = "SimulationRunner"
///
/// [process]
/// command = "mpirun -n 4 roms roms.in"
/// run_dir = "runs/2012-01"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Service life-cycle settings from `[service]`.
    #[serde(default)]
    pub service: RawServiceConfig,

    /// What to run from `[process]`.
    #[serde(default)]
    pub process: ProcessSection,
}

/// Validated configuration. Built with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub service: ServiceConfiguration,
    pub process: ProcessSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(service: ServiceConfiguration, process: ProcessSection) -> Self {
        Self { service, process }
    }
}

/// `[service]` section, exactly as written by the user.
///
/// Nothing here is validated; [`ServiceConfiguration`] is the checked form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawServiceConfig {
    /// `true`: run until the shutdown criteria are met. `false`: run exactly
    /// one iteration and exit.
    #[serde(default)]
    pub as_service: bool,

    /// Seconds to wait between iterations of the main loop.
    #[serde(default)]
    pub loop_delay: f64,

    /// Seconds between health checks; `None` disables the health-check worker.
    ///
    /// A value of 0 runs the health check on every message the worker
    /// receives.
    #[serde(
        default = "default_health_check_frequency",
        deserialize_with = "deserialize_frequency"
    )]
    pub health_check_frequency: Option<f64>,

    /// Number of health-check periods that may pass before a
    /// "missed health check" warning is logged.
    #[serde(default = "default_health_check_log_threshold")]
    pub health_check_log_threshold: u32,

    /// Friendly name used in logs and for the health-check task.
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_health_check_frequency() -> Option<f64> {
    Some(0.0)
}

fn default_health_check_log_threshold() -> u32 {
    3
}

fn default_name() -> String {
    "Service".to_string()
}

impl Default for RawServiceConfig {
    fn default() -> Self {
        Self {
            as_service: false,
            loop_delay: 0.0,
            health_check_frequency: default_health_check_frequency(),
            health_check_log_threshold: default_health_check_log_threshold(),
            name: default_name(),
            log_level: LogLevel::default(),
        }
    }
}

/// Either a number of seconds or a keyword such as `"disabled"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FrequencyValue {
    Seconds(f64),
    Keyword(String),
}

fn deserialize_frequency<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match FrequencyValue::deserialize(deserializer)? {
        FrequencyValue::Seconds(secs) => Ok(Some(secs)),
        FrequencyValue::Keyword(word) => match word.trim().to_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(None),
            other => Err(serde::de::Error::custom(format!(
                "invalid health_check_frequency: {other} (expected seconds or \"disabled\")"
            ))),
        },
    }
}

/// Immutable, validated configuration consumed by
/// [`ServiceRunner`](crate::service::ServiceRunner).
///
/// Construct with `ServiceConfiguration::try_from(raw)`; negative delays or
/// frequencies are rejected there.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfiguration {
    as_service: bool,
    loop_delay: Duration,
    health_check_frequency: Option<Duration>,
    health_check_log_threshold: u32,
    name: String,
    log_level: LogLevel,
}

impl ServiceConfiguration {
    /// Validate `raw` into a configuration.
    pub fn new(raw: RawServiceConfig) -> crate::errors::Result<Self> {
        Self::try_from(raw)
    }

    pub(crate) fn new_unchecked(
        as_service: bool,
        loop_delay: Duration,
        health_check_frequency: Option<Duration>,
        health_check_log_threshold: u32,
        name: String,
        log_level: LogLevel,
    ) -> Self {
        Self {
            as_service,
            loop_delay,
            health_check_frequency,
            health_check_log_threshold,
            name,
            log_level,
        }
    }

    /// Same configuration with `as_service` replaced.
    pub fn with_as_service(mut self, as_service: bool) -> Self {
        self.as_service = as_service;
        self
    }

    /// Same configuration with `loop_delay` replaced.
    pub fn with_loop_delay(mut self, loop_delay: Duration) -> Self {
        self.loop_delay = loop_delay;
        self
    }

    pub fn as_service(&self) -> bool {
        self.as_service
    }

    pub fn loop_delay(&self) -> Duration {
        self.loop_delay
    }

    /// `None` when health checks are disabled.
    pub fn health_check_frequency(&self) -> Option<Duration> {
        self.health_check_frequency
    }

    pub fn health_check_log_threshold(&self) -> u32 {
        self.health_check_log_threshold
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Longest gap between health checks before the worker warns.
    ///
    /// `frequency * threshold`, or one second when health checks are disabled
    /// or run on every message.
    pub fn max_health_check_latency(&self) -> Duration {
        match self.health_check_frequency {
            Some(freq) if !freq.is_zero() => freq * self.health_check_log_threshold,
            _ => Duration::from_secs(1),
        }
    }
}

impl Default for ServiceConfiguration {
    fn default() -> Self {
        let raw = RawServiceConfig::default();
        Self::new_unchecked(
            raw.as_service,
            Duration::ZERO,
            Some(Duration::ZERO),
            raw.health_check_log_threshold,
            raw.name,
            raw.log_level,
        )
    }
}

/// `[process]` section: the command the `simexec` binary runs.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProcessSection {
    /// Whitespace-separated command; overridden by CLI trailing arguments.
    #[serde(default)]
    pub command: Option<String>,

    /// Working directory; defaults to the current directory.
    #[serde(default)]
    pub run_dir: Option<PathBuf>,

    /// Merged stdout+stderr destination; defaults to a timestamped file in
    /// `run_dir`.
    #[serde(default)]
    pub output_file: Option<PathBuf>,

    /// Cancel the process if the service shuts down while it is still
    /// running (e.g. on SIGTERM). Defaults to `true`.
    #[serde(default)]
    pub cancel_on_shutdown: Option<bool>,
}

impl ProcessSection {
    pub fn effective_cancel_on_shutdown(&self) -> bool {
        self.cancel_on_shutdown.unwrap_or(true)
    }
}
