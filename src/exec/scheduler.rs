// src/exec/scheduler.rs

//! Batch-scheduler job handler.
//!
//! Only the contract lives here: a [`BatchScheduler`] describes what a site
//! scheduler can tell us and do, and [`SchedulerJob`] resolves a
//! [`JobRequest`] against it (walltime defaults, node distribution) before
//! exposing the same [`ExecutionHandler`] surface as a local process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use chrono::Local;
use regex::Regex;
use tracing::{info, warn};

use crate::errors::{Result, SimexecError};
use crate::exec::handler::ExecutionHandler;
use crate::exec::status::ExecutionStatus;

/// Maximum run time of a job, written `HH:MM:SS` (hours may exceed 24).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Walltime(u64);

fn walltime_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+):([0-5]\d):([0-5]\d)$").expect("walltime pattern is a valid regex")
    })
}

impl Walltime {
    pub fn from_secs(secs: u64) -> Self {
        Walltime(secs)
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }
}

impl FromStr for Walltime {
    type Err = SimexecError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || SimexecError::SchedulerError(format!("invalid walltime '{s}', expected HH:MM:SS"));
        let caps = walltime_pattern().captures(s.trim()).ok_or_else(invalid)?;
        let field = |i: usize| caps[i].parse::<u64>().map_err(|_| invalid());

        let (hours, minutes, seconds) = (field(1)?, field(2)?, field(3)?);
        let secs = hours
            .checked_mul(3600)
            .and_then(|h| h.checked_add(minutes * 60 + seconds))
            .ok_or_else(invalid)?;
        Ok(Walltime(secs))
    }
}

impl fmt::Display for Walltime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.0 / 3600;
        let m = (self.0 % 3600) / 60;
        let s = self.0 % 60;
        write!(f, "{h:02}:{m:02}:{s:02}")
    }
}

/// What the scheduler knows about one of its queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: String,
    /// `None` when the site does not publish a limit.
    pub max_walltime: Option<Walltime>,
}

/// Job state in the scheduler's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeJobState {
    Queued,
    Held,
    Running,
    Exiting,
    Completed,
    /// Finished with a reported exit status (PBS-style `F`).
    Finished { exit_status: i32 },
    Failed,
    Cancelled,
    Other(String),
}

impl From<&NativeJobState> for ExecutionStatus {
    fn from(state: &NativeJobState) -> Self {
        match state {
            NativeJobState::Queued => ExecutionStatus::Pending,
            NativeJobState::Held => ExecutionStatus::Held,
            NativeJobState::Running => ExecutionStatus::Running,
            NativeJobState::Exiting => ExecutionStatus::Ending,
            NativeJobState::Completed => ExecutionStatus::Completed,
            NativeJobState::Finished { exit_status: 0 } => ExecutionStatus::Completed,
            NativeJobState::Finished { .. } => ExecutionStatus::Failed,
            NativeJobState::Failed => ExecutionStatus::Failed,
            NativeJobState::Cancelled => ExecutionStatus::Cancelled,
            NativeJobState::Other(_) => ExecutionStatus::Unknown,
        }
    }
}

/// Interface to a site batch scheduler (Slurm, PBS, ...).
///
/// Implementations own the scheduler-specific syntax; nothing in this crate
/// builds job scripts or parses command output.
pub trait BatchScheduler: Send + Sync {
    fn name(&self) -> &str;

    /// Queue used when a request does not name one.
    fn primary_queue(&self) -> &str;

    fn queue(&self, name: &str) -> Option<QueueInfo>;

    /// CPUs available on one node, if the scheduler can tell.
    fn max_cpus_per_node(&self) -> Option<u32>;

    /// Whether jobs must state an explicit nodes x CPUs-per-node layout.
    fn requires_task_distribution(&self) -> bool;

    /// Enqueue the job and return the scheduler's id for it.
    fn submit(&self, job: &JobSpec) -> Result<String>;

    fn query(&self, job_id: &str) -> Result<NativeJobState>;

    fn cancel(&self, job_id: &str) -> Result<()>;
}

/// Caller's description of a job before it is resolved against a scheduler.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub commands: String,
    pub account_key: String,
    pub cpus: u32,
    pub nodes: Option<u32>,
    pub cpus_per_node: Option<u32>,
    pub run_path: Option<PathBuf>,
    pub job_name: Option<String>,
    pub output_file: Option<PathBuf>,
    pub queue_name: Option<String>,
    pub walltime: Option<Walltime>,
}

impl JobRequest {
    pub fn new(commands: impl Into<String>, account_key: impl Into<String>, cpus: u32) -> Self {
        Self {
            commands: commands.into(),
            account_key: account_key.into(),
            cpus,
            ..Self::default()
        }
    }
}

/// A fully resolved job, ready to be handed to [`BatchScheduler::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub commands: String,
    pub account_key: String,
    pub cpus: u32,
    pub nodes: Option<u32>,
    pub cpus_per_node: Option<u32>,
    pub run_path: PathBuf,
    pub job_name: String,
    pub output_file: PathBuf,
    pub queue_name: String,
    pub walltime: Walltime,
}

/// Split `cpus` over as few nodes of `max_cpus_per_node` as possible, spreading
/// them evenly. Returns `(nodes, cpus_per_node)`.
///
/// 192 CPUs on 128-CPU nodes gives `(2, 96)`.
pub fn calculate_node_distribution(cpus: u32, max_cpus_per_node: u32) -> (u32, u32) {
    let max = max_cpus_per_node.max(1);
    let nodes = cpus.div_ceil(max).max(1);
    (nodes, cpus.div_ceil(nodes))
}

fn resolve_walltime(requested: Option<Walltime>, queue: &QueueInfo) -> Result<Walltime> {
    match (requested, queue.max_walltime) {
        (None, None) => Err(SimexecError::SchedulerError(format!(
            "walltime not provided and the maximum walltime for queue '{}' is unknown",
            queue.name
        ))),
        (Some(walltime), None) => {
            warn!(
                queue = %queue.name,
                %walltime,
                "unable to determine the maximum walltime for queue; the job may be rejected"
            );
            Ok(walltime)
        }
        (None, Some(max)) => {
            warn!(queue = %queue.name, walltime = %max, "walltime unspecified; using queue maximum");
            Ok(max)
        }
        (Some(walltime), Some(max)) if walltime > max => {
            Err(SimexecError::SchedulerError(format!(
                "walltime {walltime} exceeds the maximum for queue '{}' ({max})",
                queue.name
            )))
        }
        (Some(walltime), Some(_)) => Ok(walltime),
    }
}

fn resolve_distribution(
    scheduler: &dyn BatchScheduler,
    cpus: u32,
    nodes: Option<u32>,
    cpus_per_node: Option<u32>,
) -> Result<(Option<u32>, Option<u32>)> {
    if !scheduler.requires_task_distribution() {
        return Ok((nodes, cpus_per_node));
    }

    match (nodes, cpus_per_node) {
        (None, Some(per_node)) if per_node > 0 => {
            Ok((Some(cpus.div_ceil(per_node)), Some(per_node)))
        }
        (Some(n), None) if n > 0 => Ok((Some(n), Some(cpus / n))),
        (None, None) => {
            let max = scheduler.max_cpus_per_node().ok_or_else(|| {
                SimexecError::SchedulerError(format!(
                    "scheduler '{}' requires nodes and cpus_per_node, and its CPUs per node is unknown",
                    scheduler.name()
                ))
            })?;
            let (n, per_node) = calculate_node_distribution(cpus, max);
            warn!(
                cpus,
                nodes = n,
                cpus_per_node = per_node,
                max_cpus_per_node = max,
                "nodes and cpus_per_node not given; using computed distribution"
            );
            Ok((Some(n), Some(per_node)))
        }
        (Some(0), _) | (_, Some(0)) => Err(SimexecError::SchedulerError(
            "nodes and cpus_per_node must be positive".to_string(),
        )),
        other => Ok(other),
    }
}

/// A job submitted to a [`BatchScheduler`].
pub struct SchedulerJob {
    scheduler: Arc<dyn BatchScheduler>,
    spec: JobSpec,
    id: Option<String>,
}

impl fmt::Debug for SchedulerJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerJob")
            .field("scheduler", &self.scheduler.name())
            .field("spec", &self.spec)
            .field("id", &self.id)
            .finish()
    }
}

impl SchedulerJob {
    /// Resolve `request` against `scheduler`'s queues and node layout.
    pub fn new(scheduler: Arc<dyn BatchScheduler>, request: JobRequest) -> Result<Self> {
        let default_name = format!("simexec_job_{}", Local::now().format("%Y%m%d_%H%M%S"));

        let queue_name = request
            .queue_name
            .unwrap_or_else(|| scheduler.primary_queue().to_string());
        let queue = scheduler.queue(&queue_name).ok_or_else(|| {
            SimexecError::SchedulerError(format!(
                "queue '{queue_name}' is not known to scheduler '{}'",
                scheduler.name()
            ))
        })?;

        let walltime = resolve_walltime(request.walltime, &queue)?;
        let (nodes, cpus_per_node) = resolve_distribution(
            scheduler.as_ref(),
            request.cpus,
            request.nodes,
            request.cpus_per_node,
        )?;

        let run_path = match request.run_path {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        let output_file = request
            .output_file
            .unwrap_or_else(|| run_path.join(format!("{default_name}.out")));

        let spec = JobSpec {
            commands: request.commands,
            account_key: request.account_key,
            cpus: request.cpus,
            nodes,
            cpus_per_node,
            run_path,
            job_name: request.job_name.unwrap_or(default_name),
            output_file,
            queue_name,
            walltime,
        };

        Ok(Self {
            scheduler,
            spec,
            id: None,
        })
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// Scheduler-assigned id, once submitted.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn submit(&mut self) -> Result<()> {
        if let Some(id) = &self.id {
            return Err(SimexecError::AlreadyStarted(format!(
                "job '{}' was already submitted with id {id}",
                self.spec.job_name
            )));
        }

        let id = self.scheduler.submit(&self.spec)?;
        info!(
            scheduler = self.scheduler.name(),
            job = %self.spec.job_name,
            %id,
            queue = %self.spec.queue_name,
            walltime = %self.spec.walltime,
            "submitted scheduler job"
        );
        self.id = Some(id);
        Ok(())
    }
}

impl ExecutionHandler for SchedulerJob {
    fn observe(&mut self) -> ExecutionStatus {
        let Some(id) = &self.id else {
            return ExecutionStatus::Unsubmitted;
        };

        match self.scheduler.query(id) {
            Ok(state) => ExecutionStatus::from(&state),
            Err(e) => {
                warn!(job = %self.spec.job_name, %id, error = %e, "failed to query scheduler job state");
                ExecutionStatus::Unknown
            }
        }
    }

    fn output_file(&self) -> &Path {
        &self.spec.output_file
    }

    fn cancel(&mut self) -> Result<()> {
        let status = self.observe();
        let id = match (&self.id, status) {
            (Some(id), ExecutionStatus::Running | ExecutionStatus::Pending) => id.clone(),
            _ => {
                info!(job = %self.spec.job_name, %status, "cannot cancel job with status '{status}'");
                return Ok(());
            }
        };

        self.scheduler.cancel(&id)?;
        info!(job = %self.spec.job_name, %id, "cancelled scheduler job");
        Ok(())
    }
}
