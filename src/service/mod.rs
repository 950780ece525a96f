// src/service/mod.rs

//! Generic service life-cycle engine.
//!
//! - [`hooks`] defines the [`Service`] and [`HealthCheck`] traits.
//! - [`runner`] owns the main loop ([`ServiceRunner`]).
//! - [`health`] is the background health-check worker.
//! - [`message`] is the worker's message format.
//! - [`signal`] turns SIGINT/SIGTERM into a shutdown request.

pub mod health;
pub mod hooks;
pub mod message;
pub mod runner;
pub mod signal;

pub use health::{HealthReporter, HealthSchedule, HealthWorker};
pub use hooks::{HealthCheck, HookResult, NoopHealthCheck, Service, ServiceContext};
pub use message::HealthMessage;
pub use runner::{JOIN_TIMEOUT, ServiceRunner, StopReason};
pub use signal::{ShutdownSignal, SignalListener};
