#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use simexec::errors::{Result, SimexecError};
use simexec::exec::{
    BatchScheduler, ExecutionHandler, ExecutionStatus, JobSpec, NativeJobState, QueueInfo,
};
use simexec::service::{HealthCheck, HookResult, Service, ServiceContext};

/// Per-hook call counters shared between a `RecordingService` and the test.
#[derive(Debug, Default)]
pub struct HookCounts {
    pub on_start: AtomicU64,
    pub on_iteration: AtomicU64,
    pub on_iteration_complete: AtomicU64,
    pub on_delay: AtomicU64,
    pub can_shutdown: AtomicU64,
    pub on_shutdown: AtomicU64,
    pub health_checks: AtomicU64,
}

impl HookCounts {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }

    pub fn iterations(&self) -> u64 {
        Self::get(&self.on_iteration)
    }

    pub fn shutdowns(&self) -> u64 {
        Self::get(&self.on_shutdown)
    }

    pub fn checks(&self) -> u64 {
        Self::get(&self.health_checks)
    }
}

/// A `Service` that counts hook calls and fails on request.
#[derive(Debug)]
pub struct RecordingService {
    counts: Arc<HookCounts>,
    shutdown_after: Option<u64>,
    iteration_sleep: Duration,
    fail_on_start: bool,
    fail_can_shutdown: bool,
    fail_on_delay: bool,
    fail_on_shutdown: bool,
    panic_on_shutdown: bool,
    fail_iteration_at: Option<u64>,
    panic_iteration_at: Option<u64>,
    fail_health_check_after: Option<u64>,
}

impl RecordingService {
    /// Never asks to shut down on its own.
    pub fn new() -> Self {
        Self {
            counts: Arc::new(HookCounts::default()),
            shutdown_after: None,
            iteration_sleep: Duration::ZERO,
            fail_on_start: false,
            fail_can_shutdown: false,
            fail_on_delay: false,
            fail_on_shutdown: false,
            panic_on_shutdown: false,
            fail_iteration_at: None,
            panic_iteration_at: None,
            fail_health_check_after: None,
        }
    }

    pub fn counts(&self) -> Arc<HookCounts> {
        Arc::clone(&self.counts)
    }

    /// `can_shutdown` returns true once `n` iterations have run.
    pub fn shutdown_after(mut self, n: u64) -> Self {
        self.shutdown_after = Some(n);
        self
    }

    /// Block inside every `on_iteration` for `d`.
    pub fn iteration_sleep(mut self, d: Duration) -> Self {
        self.iteration_sleep = d;
        self
    }

    pub fn fail_on_start(mut self) -> Self {
        self.fail_on_start = true;
        self
    }

    pub fn fail_can_shutdown(mut self) -> Self {
        self.fail_can_shutdown = true;
        self
    }

    pub fn fail_on_delay(mut self) -> Self {
        self.fail_on_delay = true;
        self
    }

    pub fn fail_on_shutdown(mut self) -> Self {
        self.fail_on_shutdown = true;
        self
    }

    pub fn panic_on_shutdown(mut self) -> Self {
        self.panic_on_shutdown = true;
        self
    }

    /// Return `Err` from the iteration with this zero-based index.
    pub fn fail_iteration_at(mut self, n: u64) -> Self {
        self.fail_iteration_at = Some(n);
        self
    }

    pub fn panic_iteration_at(mut self, n: u64) -> Self {
        self.panic_iteration_at = Some(n);
        self
    }

    /// Health check fails once it has succeeded `n` times.
    pub fn fail_health_check_after(mut self, n: u64) -> Self {
        self.fail_health_check_after = Some(n);
        self
    }
}

impl Default for RecordingService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for RecordingService {
    fn on_start(&mut self) -> HookResult {
        self.counts.on_start.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_start {
            return Err(anyhow!("on_start failed on purpose"));
        }
        Ok(())
    }

    fn on_iteration(&mut self, ctx: &ServiceContext) -> HookResult {
        let index = self.counts.on_iteration.fetch_add(1, Ordering::SeqCst);
        if !self.iteration_sleep.is_zero() {
            std::thread::sleep(self.iteration_sleep);
        }
        if self.panic_iteration_at == Some(index) {
            panic!("iteration {index} panicked on purpose");
        }
        if self.fail_iteration_at == Some(index) {
            return Err(anyhow!("iteration {index} failed on purpose"));
        }
        ctx.send_update([("iteration", index.to_string())]);
        Ok(())
    }

    fn on_iteration_complete(&mut self) -> HookResult {
        self.counts.on_iteration_complete.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_delay(&mut self) -> HookResult {
        self.counts.on_delay.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_delay {
            return Err(anyhow!("on_delay failed on purpose"));
        }
        Ok(())
    }

    fn can_shutdown(&mut self) -> HookResult<bool> {
        self.counts.can_shutdown.fetch_add(1, Ordering::SeqCst);
        if self.fail_can_shutdown {
            return Err(anyhow!("can_shutdown failed on purpose"));
        }
        Ok(self
            .shutdown_after
            .is_some_and(|n| self.counts.iterations() >= n))
    }

    fn on_shutdown(&mut self) -> HookResult {
        self.counts.on_shutdown.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_shutdown {
            panic!("on_shutdown panicked on purpose");
        }
        if self.fail_on_shutdown {
            return Err(anyhow!("on_shutdown failed on purpose"));
        }
        Ok(())
    }

    fn health_check(&self) -> Box<dyn HealthCheck> {
        let counts = Arc::clone(&self.counts);
        let fail_after = self.fail_health_check_after;
        Box::new(move || {
            let done = counts.health_checks.fetch_add(1, Ordering::SeqCst);
            match fail_after {
                Some(n) if done >= n => Err(anyhow!("health check failed on purpose")),
                _ => Ok(()),
            }
        })
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    next_id: u64,
    submitted: Vec<JobSpec>,
    states: HashMap<String, NativeJobState>,
    cancelled: Vec<String>,
    fail_queries: bool,
}

/// In-memory `BatchScheduler`: jobs start `Queued` and move only when the
/// test says so.
#[derive(Debug)]
pub struct FakeScheduler {
    queues: Vec<QueueInfo>,
    max_cpus_per_node: Option<u32>,
    requires_task_distribution: bool,
    state: Mutex<SchedulerState>,
}

impl FakeScheduler {
    /// One queue, `main`, with the given maximum walltime.
    pub fn new(max_walltime: Option<&str>) -> Self {
        Self {
            queues: vec![QueueInfo {
                name: "main".to_string(),
                max_walltime: max_walltime.map(|w| w.parse().expect("valid walltime")),
            }],
            max_cpus_per_node: None,
            requires_task_distribution: false,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn with_queue(mut self, name: &str, max_walltime: Option<&str>) -> Self {
        self.queues.push(QueueInfo {
            name: name.to_string(),
            max_walltime: max_walltime.map(|w| w.parse().expect("valid walltime")),
        });
        self
    }

    /// Require a nodes x CPUs layout, with nodes of `max_cpus_per_node`.
    pub fn with_task_distribution(mut self, max_cpus_per_node: Option<u32>) -> Self {
        self.requires_task_distribution = true;
        self.max_cpus_per_node = max_cpus_per_node;
        self
    }

    pub fn set_state(&self, job_id: &str, state: NativeJobState) {
        self.state
            .lock()
            .unwrap()
            .states
            .insert(job_id.to_string(), state);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state.lock().unwrap().fail_queries = fail;
    }

    pub fn submitted(&self) -> Vec<JobSpec> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }
}

impl BatchScheduler for FakeScheduler {
    fn name(&self) -> &str {
        "fake"
    }

    fn primary_queue(&self) -> &str {
        &self.queues[0].name
    }

    fn queue(&self, name: &str) -> Option<QueueInfo> {
        self.queues.iter().find(|q| q.name == name).cloned()
    }

    fn max_cpus_per_node(&self) -> Option<u32> {
        self.max_cpus_per_node
    }

    fn requires_task_distribution(&self) -> bool {
        self.requires_task_distribution
    }

    fn submit(&self, job: &JobSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("{}", 1000 + state.next_id);
        state.submitted.push(job.clone());
        state.states.insert(id.clone(), NativeJobState::Queued);
        Ok(id)
    }

    fn query(&self, job_id: &str) -> Result<NativeJobState> {
        let state = self.state.lock().unwrap();
        if state.fail_queries {
            return Err(SimexecError::SchedulerError("query failed on purpose".into()));
        }
        state
            .states
            .get(job_id)
            .cloned()
            .ok_or_else(|| SimexecError::SchedulerError(format!("unknown job {job_id}")))
    }

    fn cancel(&self, job_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.cancelled.push(job_id.to_string());
        state
            .states
            .insert(job_id.to_string(), NativeJobState::Cancelled);
        Ok(())
    }
}

/// Test-side handle that drives a `FakeHandler`.
#[derive(Debug, Clone)]
pub struct FakeHandlerControl {
    status: Arc<Mutex<ExecutionStatus>>,
    cancels: Arc<AtomicU64>,
}

impl FakeHandlerControl {
    pub fn set(&self, status: ExecutionStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn status(&self) -> ExecutionStatus {
        *self.status.lock().unwrap()
    }

    pub fn cancels(&self) -> u64 {
        self.cancels.load(Ordering::SeqCst)
    }
}

/// `ExecutionHandler` whose status is set by the test.
#[derive(Debug)]
pub struct FakeHandler {
    control: FakeHandlerControl,
    output_file: PathBuf,
}

impl FakeHandler {
    pub fn new(initial: ExecutionStatus, output_file: impl Into<PathBuf>) -> (Self, FakeHandlerControl) {
        let control = FakeHandlerControl {
            status: Arc::new(Mutex::new(initial)),
            cancels: Arc::new(AtomicU64::new(0)),
        };
        let handler = Self {
            control: control.clone(),
            output_file: output_file.into(),
        };
        (handler, control)
    }
}

impl ExecutionHandler for FakeHandler {
    fn observe(&mut self) -> ExecutionStatus {
        self.control.status()
    }

    fn output_file(&self) -> &Path {
        &self.output_file
    }

    fn cancel(&mut self) -> Result<()> {
        self.control.cancels.fetch_add(1, Ordering::SeqCst);
        if matches!(
            self.control.status(),
            ExecutionStatus::Running | ExecutionStatus::Pending
        ) {
            self.control.set(ExecutionStatus::Cancelled);
        }
        Ok(())
    }
}
