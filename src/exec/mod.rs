// src/exec/mod.rs

//! Execution layer.
//!
//! Everything a service needs to run and monitor a unit of work without caring
//! where it runs.
//!
//! - [`status`] holds the closed [`ExecutionStatus`] set.
//! - [`handler`] defines the [`ExecutionHandler`] trait every handler implements.
//! - [`tail`] implements the live output stream behind `updates()`.
//! - [`local`] runs a command as a direct child process.
//! - [`scheduler`] submits work through a [`BatchScheduler`] implementation.

pub mod handler;
pub mod local;
pub mod scheduler;
pub mod status;
pub mod tail;

pub use handler::ExecutionHandler;
pub use local::{CancelOutcome, LocalProcess};
pub use scheduler::{
    BatchScheduler, JobRequest, JobSpec, NativeJobState, QueueInfo, SchedulerJob, Walltime,
    calculate_node_distribution,
};
pub use status::ExecutionStatus;
pub use tail::{UpdateOptions, stream_updates};
