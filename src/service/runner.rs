// src/service/runner.rs

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ServiceConfiguration;
use crate::service::health::{HealthSchedule, HealthWorker};
use crate::service::hooks::{Service, ServiceContext, guarded};
use crate::service::signal::SignalListener;

/// How long shutdown waits for the health-check worker before abandoning it.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Why the main loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// One-shot run finished or `can_shutdown` said so.
    Completed,
    StartFailed,
    HookFailed,
    /// A signal (or the injected shutdown future) fired.
    ShutdownRequested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Completed => "completed",
            StopReason::StartFailed => "on_start failed",
            StopReason::HookFailed => "service hook failed",
            StopReason::ShutdownRequested => "shutdown requested",
        };
        f.write_str(s)
    }
}

/// Drives a [`Service`] through start, iterate, health-check and shutdown.
///
/// ```no_run
/// # use simexec::service::{Service, ServiceContext, ServiceRunner, HookResult};
/// # use simexec::config::ServiceConfiguration;
/// struct Once;
/// impl Service for Once {
///     fn on_iteration(&mut self, _ctx: &ServiceContext) -> HookResult { Ok(()) }
///     fn can_shutdown(&mut self) -> HookResult<bool> { Ok(true) }
/// }
/// # async fn demo() {
/// let mut runner = ServiceRunner::new(Once, ServiceConfiguration::default());
/// runner.execute().await;
/// # }
/// ```
pub struct ServiceRunner<S: Service> {
    service: S,
    config: ServiceConfiguration,
    worker: Option<HealthWorker>,
    iterations: u64,
    stop_reason: Option<StopReason>,
    shut_down: bool,
    signals: Option<SignalListener>,
}

impl<S: Service> fmt::Debug for ServiceRunner<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRunner")
            .field("config", &self.config)
            .field("iterations", &self.iterations)
            .field("stop_reason", &self.stop_reason)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

impl<S: Service> ServiceRunner<S> {
    /// Wrap `service` without running anything yet.
    ///
    /// When called inside a tokio runtime, the SIGINT and SIGTERM handlers are
    /// installed here, and a signal received before [`execute`](Self::execute)
    /// stops the loop as soon as it starts. Outside a runtime they are
    /// installed when `execute()` begins, and until then a signal gets the
    /// default action. tokio never uninstalls a handler: once `execute()`
    /// returns, further SIGINT/SIGTERM are swallowed for the rest of the
    /// process.
    pub fn new(service: S, config: ServiceConfiguration) -> Self {
        let signals = tokio::runtime::Handle::try_current()
            .ok()
            .and_then(|_| install_signals(config.name()));
        Self {
            service,
            config,
            worker: None,
            iterations: 0,
            stop_reason: None,
            shut_down: false,
            signals,
        }
    }

    pub fn config(&self) -> &ServiceConfiguration {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub fn into_inner(self) -> S {
        self.service
    }

    /// Iterations that ran to completion (both iteration hooks succeeded).
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Why the last `execute()` stopped; `None` before it ran.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn is_healthcheck_running(&self) -> bool {
        self.worker.as_ref().is_some_and(HealthWorker::is_running)
    }

    pub fn is_healthcheck_queue_ready(&self) -> bool {
        self.worker.as_ref().is_some_and(HealthWorker::is_queue_ready)
    }

    /// Whether the loop should stop after the current iteration.
    ///
    /// Always `true` for one-shot runs. Otherwise asks the service; a failing
    /// predicate counts as `true` so a broken service still terminates.
    pub fn can_shutdown(&mut self) -> bool {
        if !self.config.as_service() {
            return true;
        }
        guarded(self.config.name(), "can_shutdown", || {
            self.service.can_shutdown()
        })
        .unwrap_or(true)
    }

    /// Run the service to completion, stopping early on SIGINT or SIGTERM.
    ///
    /// Never fails: hook errors are logged and lead to a clean shutdown.
    pub async fn execute(&mut self) {
        let listener = match self.signals.take() {
            Some(listener) => Some(listener),
            None => install_signals(self.config.name()),
        };

        self.execute_until(async move {
            match listener {
                Some(mut listener) => {
                    listener.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        })
        .await
    }

    /// Like [`execute`](Self::execute), but shutdown is requested when
    /// `shutdown` resolves instead of on OS signals.
    pub async fn execute_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shut_down {
            warn!(service = %self.config.name(), "service already executed; ignoring");
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        let trigger = tokio::spawn(async move {
            shutdown.await;
            let _ = tx.send(true);
        });

        let reason = self.run_loop(&mut rx).await;
        self.stop_reason = Some(reason);
        self.shutdown(reason).await;

        trigger.abort();
    }

    async fn run_loop(&mut self, shutdown_rx: &mut watch::Receiver<bool>) -> StopReason {
        let name = self.config.name().to_string();
        info!(
            service = %name,
            as_service = self.config.as_service(),
            loop_delay_ms = self.config.loop_delay().as_millis() as u64,
            "starting service"
        );

        if guarded(&name, "on_start", || self.service.on_start()).is_none() {
            return StopReason::StartFailed;
        }

        if let Some(frequency) = self.config.health_check_frequency() {
            let schedule = HealthSchedule {
                frequency,
                max_latency: self.config.max_health_check_latency(),
            };
            self.worker = Some(HealthWorker::spawn(&name, schedule, self.service.health_check()));
        }
        let reporter = self.worker.as_ref().map(HealthWorker::reporter);
        let mut ctx = ServiceContext::new(name.clone(), reporter.clone());

        loop {
            if *shutdown_rx.borrow() {
                return StopReason::ShutdownRequested;
            }

            ctx.set_iteration(self.iterations);
            if guarded(&name, "on_iteration", || self.service.on_iteration(&ctx)).is_none() {
                return StopReason::HookFailed;
            }
            if guarded(&name, "on_iteration_complete", || {
                self.service.on_iteration_complete()
            })
            .is_none()
            {
                return StopReason::HookFailed;
            }
            self.iterations += 1;
            debug!(service = %name, iteration = self.iterations, "iteration complete");

            if self.can_shutdown() {
                return StopReason::Completed;
            }

            let delay = self.config.loop_delay();
            if delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            if guarded(&name, "on_delay", || self.service.on_delay()).is_none() {
                return StopReason::HookFailed;
            }

            tokio::select! {
                _ = sleep(delay) => {}
                true = shutdown_requested(shutdown_rx) => {
                    return StopReason::ShutdownRequested;
                }
            }

            if let Some(reporter) = &reporter {
                reporter.heartbeat();
            }
        }
    }

    async fn shutdown(&mut self, reason: StopReason) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let name = self.config.name().to_string();
        info!(service = %name, %reason, iterations = self.iterations, "shutting down service");

        if let Some(worker) = self.worker.as_mut() {
            worker.terminate(&reason.to_string(), JOIN_TIMEOUT).await;
        }

        guarded(&name, "on_shutdown", || self.service.on_shutdown());
        info!(service = %name, "service stopped");
    }
}

fn install_signals(service: &str) -> Option<SignalListener> {
    match SignalListener::install() {
        Ok(listener) => Some(listener),
        Err(e) => {
            warn!(%service, error = %e, "failed to install signal handlers");
            None
        }
    }
}

/// Resolves with `true` once shutdown is requested, or `false` if the
/// trigger went away without requesting it.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) -> bool {
    rx.wait_for(|requested| *requested).await.is_ok()
}
