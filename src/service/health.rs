// src/service/health.rs

//! Background health-check worker.
//!
//! One task per runner, fed through one bounded channel. The main loop and
//! the signal path only ever send; the worker never touches service state.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, warn};

use crate::service::hooks::{HealthCheck, guarded};
use crate::service::message::{HealthMessage, REASON_KEY};

/// Capacity of the worker's message queue.
pub const QUEUE_CAPACITY: usize = 64;

/// Timing parameters of one worker.
#[derive(Debug, Clone, Copy)]
pub struct HealthSchedule {
    /// Zero means "check on every message".
    pub frequency: Duration,
    /// Gap after which a missed check is reported.
    pub max_latency: Duration,
}

/// Cloneable sending side of the worker's queue.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    name: String,
    tx: mpsc::Sender<HealthMessage>,
}

impl HealthReporter {
    /// Queue `msg` without waiting. Returns `false` when the queue is full
    /// or the worker has gone away.
    pub fn send(&self, msg: HealthMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                warn!(service = %self.name, %msg, "health check queue full; message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(service = %self.name, "health check worker gone; message dropped");
                false
            }
        }
    }

    pub fn send_update<I, K, V>(&self, content: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.send(HealthMessage::new(content));
    }

    pub fn heartbeat(&self) {
        self.send(HealthMessage::heartbeat());
    }

    /// Whether the worker is still receiving.
    pub fn is_ready(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Handle to a running health-check worker.
#[derive(Debug)]
pub struct HealthWorker {
    reporter: HealthReporter,
    handle: Option<JoinHandle<()>>,
}

impl HealthWorker {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(name: &str, schedule: HealthSchedule, check: Box<dyn HealthCheck>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let started = Instant::now();
        let handle = tokio::spawn(
            worker_loop(name.to_string(), schedule, check, rx, started).with_current_subscriber(),
        );

        info!(
            service = %name,
            frequency_ms = schedule.frequency.as_millis() as u64,
            max_latency_ms = schedule.max_latency.as_millis() as u64,
            "health check worker started"
        );

        Self {
            reporter: HealthReporter {
                name: name.to_string(),
                tx,
            },
            handle: Some(handle),
        }
    }

    pub fn reporter(&self) -> HealthReporter {
        self.reporter.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Whether a message sent now would reach a live worker.
    pub fn is_queue_ready(&self) -> bool {
        self.is_running() && self.reporter.is_ready()
    }

    /// Send the quit message and wait up to `join_timeout` for the worker to
    /// exit. A worker that does not stop in time is aborted and abandoned.
    ///
    /// Returns `true` if the worker exited on its own.
    pub async fn terminate(&mut self, reason: &str, join_timeout: Duration) -> bool {
        let Some(mut handle) = self.handle.take() else {
            return true;
        };
        let name = &self.reporter.name;

        if !handle.is_finished() {
            let quit = HealthMessage::quit(reason);
            if let Err(e) = self.reporter.tx.send_timeout(quit, join_timeout).await {
                warn!(service = %name, error = %e, "failed to deliver quit message to health check worker");
            }
        }

        match timeout(join_timeout, &mut handle).await {
            Ok(Ok(())) => {
                debug!(service = %name, "health check worker joined");
                true
            }
            Ok(Err(e)) => {
                warn!(service = %name, error = %e, "health check worker ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    service = %name,
                    timeout_ms = join_timeout.as_millis() as u64,
                    "health check worker did not stop in time; abandoning it"
                );
                handle.abort();
                false
            }
        }
    }
}

/// Next check time after a check that was due at `last + frequency`. Keeps
/// the cadence unless the worker fell more than one period behind.
fn advance(last: Instant, frequency: Duration) -> Instant {
    let scheduled = last + frequency;
    let now = Instant::now();
    if now.saturating_duration_since(scheduled) < frequency {
        scheduled
    } else {
        now
    }
}

/// A check runs only when a message arrives and one is due. A wait that
/// times out is retried.
async fn worker_loop(
    name: String,
    schedule: HealthSchedule,
    mut check: Box<dyn HealthCheck>,
    mut rx: mpsc::Receiver<HealthMessage>,
    started: Instant,
) {
    let HealthSchedule {
        frequency,
        max_latency,
    } = schedule;
    let mut last_check = started;

    loop {
        let elapsed = last_check.elapsed();
        if elapsed > max_latency {
            warn!(
                service = %name,
                elapsed_ms = elapsed.as_millis() as u64,
                max_latency_ms = max_latency.as_millis() as u64,
                "missed health check"
            );
        }

        let received = if frequency.is_zero() {
            rx.recv().await
        } else {
            // Overdue: poll once per period so the warning above repeats
            // without spinning.
            let remaining = frequency.saturating_sub(elapsed);
            let wait = if remaining.is_zero() { frequency } else { remaining };
            match timeout(wait, rx.recv()).await {
                Ok(received) => received,
                Err(_) => continue,
            }
        };

        let Some(msg) = received else {
            debug!(service = %name, "health check queue closed");
            break;
        };

        if msg.is_quit() {
            info!(
                service = %name,
                reason = msg.get(REASON_KEY).unwrap_or("unspecified"),
                "health check worker received quit"
            );
            break;
        }

        if frequency.is_zero() || last_check.elapsed() >= frequency {
            last_check = if frequency.is_zero() {
                Instant::now()
            } else {
                advance(last_check, frequency)
            };
            if guarded(&name, "on_health_check", || check.on_health_check()).is_none() {
                break;
            }
        }

        if msg.is_heartbeat() {
            debug!(service = %name, ts = msg.timestamp(), "heartbeat");
        } else {
            info!(service = %name, %msg, "health update");
        }
    }

    debug!(service = %name, "health check worker stopped");
}
