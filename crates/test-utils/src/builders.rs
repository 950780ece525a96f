#![allow(dead_code)]

use simexec::config::{RawServiceConfig, ServiceConfiguration};
use simexec::types::LogLevel;

/// Builder for `ServiceConfiguration` to simplify test setup.
///
/// Starts from the defaults with the health-check worker disabled, so tests
/// only get a worker when they ask for one.
pub struct ServiceConfigBuilder {
    raw: RawServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawServiceConfig {
                health_check_frequency: None,
                name: "TestService".to_string(),
                ..RawServiceConfig::default()
            },
        }
    }

    pub fn as_service(mut self, val: bool) -> Self {
        self.raw.as_service = val;
        self
    }

    pub fn loop_delay(mut self, secs: f64) -> Self {
        self.raw.loop_delay = secs;
        self
    }

    pub fn health_check_frequency(mut self, secs: f64) -> Self {
        self.raw.health_check_frequency = Some(secs);
        self
    }

    pub fn health_checks_disabled(mut self) -> Self {
        self.raw.health_check_frequency = None;
        self
    }

    pub fn health_check_log_threshold(mut self, threshold: u32) -> Self {
        self.raw.health_check_log_threshold = threshold;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.raw.name = name.to_string();
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.raw.log_level = level;
        self
    }

    /// The unvalidated form, for tests that exercise validation.
    pub fn raw(self) -> RawServiceConfig {
        self.raw
    }

    pub fn build(self) -> ServiceConfiguration {
        ServiceConfiguration::try_from(self.raw).expect("Failed to build valid service config from builder")
    }
}

impl Default for ServiceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
