// src/service/hooks.rs

//! Life-cycle hooks a service implements.
//!
//! [`ServiceRunner`](crate::service::ServiceRunner) drives these in a fixed
//! order: `on_start`, then `on_iteration` / `on_iteration_complete` per loop
//! pass (with `on_delay` before each inter-iteration delay), and finally
//! `on_shutdown`. Hooks run to completion on the runner's task and may block.
//!
//! A hook fails by returning `Err` or by panicking. Either way the runner
//! logs the failure and moves to the shutdown path; nothing escapes
//! `execute()`.

use tracing::{debug, error};

use crate::service::health::HealthReporter;

/// Result type of every hook body.
pub type HookResult<T = ()> = anyhow::Result<T>;

/// Domain work driven by a [`ServiceRunner`](crate::service::ServiceRunner).
pub trait Service: Send {
    /// One unit of domain work.
    fn on_iteration(&mut self, ctx: &ServiceContext) -> HookResult;

    /// `true` once the domain-level completion criteria are met. Only
    /// consulted when the service runs with `as_service = true`.
    fn can_shutdown(&mut self) -> HookResult<bool>;

    fn on_start(&mut self) -> HookResult {
        debug!("on_start: nothing to do");
        Ok(())
    }

    fn on_iteration_complete(&mut self) -> HookResult {
        debug!("on_iteration_complete: nothing to do");
        Ok(())
    }

    /// Called right before the inter-iteration delay.
    fn on_delay(&mut self) -> HookResult {
        debug!("on_delay: nothing to do");
        Ok(())
    }

    fn on_shutdown(&mut self) -> HookResult {
        debug!("on_shutdown: nothing to do");
        Ok(())
    }

    /// Build the check the health-check worker runs.
    ///
    /// The returned object is moved into the worker task and never shares
    /// state with the service unless the implementation arranges it (e.g.
    /// through an `Arc`).
    fn health_check(&self) -> Box<dyn HealthCheck> {
        Box::new(NoopHealthCheck)
    }
}

/// Periodic liveness/progress check owned by the health-check worker.
pub trait HealthCheck: Send + 'static {
    fn on_health_check(&mut self) -> HookResult;
}

impl<F> HealthCheck for F
where
    F: FnMut() -> HookResult + Send + 'static,
{
    fn on_health_check(&mut self) -> HookResult {
        self()
    }
}

/// Default check: logs and succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHealthCheck;

impl HealthCheck for NoopHealthCheck {
    fn on_health_check(&mut self) -> HookResult {
        debug!("health check");
        Ok(())
    }
}

/// What `on_iteration` gets to see of the runner.
#[derive(Debug)]
pub struct ServiceContext {
    name: String,
    iteration: u64,
    reporter: Option<HealthReporter>,
}

impl ServiceContext {
    pub(crate) fn new(name: String, reporter: Option<HealthReporter>) -> Self {
        Self {
            name,
            iteration: 0,
            reporter,
        }
    }

    pub(crate) fn set_iteration(&mut self, iteration: u64) {
        self.iteration = iteration;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero-based index of the current iteration.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Forward domain key/values to the health-check worker, which logs them.
    ///
    /// Dropped with a debug log when no worker is running.
    pub fn send_update<I, K, V>(&self, content: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        match &self.reporter {
            Some(reporter) => reporter.send_update(content),
            None => debug!(service = %self.name, "health check disabled; update dropped"),
        }
    }
}

/// Run one hook behind the error boundary: an `Err` or a panic is logged
/// and turned into `None`.
pub(crate) fn guarded<T>(
    service: &str,
    hook: &str,
    f: impl FnOnce() -> HookResult<T>,
) -> Option<T> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            error!(service, hook, error = ?err, "{hook} failed");
            None
        }
        Err(panic) => {
            error!(service, hook, panic = panic_message(&*panic), "{hook} panicked");
            None
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
