// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    ConfigFile, ProcessSection, RawConfigFile, RawServiceConfig, ServiceConfiguration,
};
use crate::errors::{Result, SimexecError};

/// Smallest accepted `health_check_log_threshold`.
pub const MIN_HEALTH_CHECK_LOG_THRESHOLD: u32 = 3;

impl TryFrom<RawServiceConfig> for ServiceConfiguration {
    type Error = SimexecError;

    fn try_from(raw: RawServiceConfig) -> std::result::Result<Self, Self::Error> {
        let loop_delay = seconds("loop_delay", raw.loop_delay)?;
        let health_check_frequency = raw
            .health_check_frequency
            .map(|secs| seconds("health_check_frequency", secs))
            .transpose()?;
        validate_threshold(raw.health_check_log_threshold)?;

        Ok(ServiceConfiguration::new_unchecked(
            raw.as_service,
            loop_delay,
            health_check_frequency,
            raw.health_check_log_threshold,
            raw.name,
            raw.log_level,
        ))
    }
}

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SimexecError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let service = ServiceConfiguration::try_from(raw.service)?;
        validate_process(&raw.process)?;
        Ok(ConfigFile::new_unchecked(service, raw.process))
    }
}

/// Validate a raw config file without converting it.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    ConfigFile::try_from(cfg.clone()).map(|_| ())
}

fn seconds(field: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() {
        return Err(SimexecError::ConfigError(format!(
            "[service].{field} must be a finite number of seconds (got {value})"
        )));
    }
    if value < 0.0 {
        return Err(SimexecError::ConfigError(format!(
            "[service].{field} must be >= 0 (got {value})"
        )));
    }
    Duration::try_from_secs_f64(value).map_err(|e| {
        SimexecError::ConfigError(format!("[service].{field} is out of range ({value}): {e}"))
    })
}

fn validate_threshold(threshold: u32) -> Result<()> {
    if threshold < MIN_HEALTH_CHECK_LOG_THRESHOLD {
        return Err(SimexecError::ConfigError(format!(
            "[service].health_check_log_threshold must be >= {MIN_HEALTH_CHECK_LOG_THRESHOLD} (got {threshold})"
        )));
    }
    Ok(())
}

fn validate_process(process: &ProcessSection) -> Result<()> {
    if let Some(cmd) = &process.command {
        if cmd.split_whitespace().next().is_none() {
            return Err(SimexecError::ConfigError(
                "[process].command must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}
