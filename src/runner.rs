// src/runner.rs

//! [`WorkRunner`]: a ready-made [`Service`] that launches one unit of work and
//! monitors it until it reaches a terminal status.

use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::exec::{ExecutionHandler, ExecutionStatus};
use crate::service::{HookResult, Service, ServiceContext};

type Launcher = Box<dyn FnMut() -> HookResult<Box<dyn ExecutionHandler>> + Send>;
type PostRun = Box<dyn FnOnce(&mut dyn ExecutionHandler) -> HookResult + Send>;

/// Launch on the first iteration, observe on every later one.
///
/// - Status transitions are logged and forwarded to the health-check worker
///   as `{"status": ...}` updates.
/// - The service may stop once the status is terminal (or `Unknown`).
/// - On shutdown, work that is still active is cancelled unless
///   [`with_cancel_on_shutdown(false)`](Self::with_cancel_on_shutdown), and
///   the post-run hook runs only if the work completed.
pub struct WorkRunner {
    name: String,
    launcher: Launcher,
    handler: Option<Box<dyn ExecutionHandler>>,
    last_status: Option<ExecutionStatus>,
    cancel_on_shutdown: bool,
    post_run: Option<PostRun>,
}

impl fmt::Debug for WorkRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkRunner")
            .field("name", &self.name)
            .field("launched", &self.handler.is_some())
            .field("last_status", &self.last_status)
            .field("cancel_on_shutdown", &self.cancel_on_shutdown)
            .finish_non_exhaustive()
    }
}

impl WorkRunner {
    pub fn new<F>(name: impl Into<String>, launcher: F) -> Self
    where
        F: FnMut() -> HookResult<Box<dyn ExecutionHandler>> + Send + 'static,
    {
        Self {
            name: name.into(),
            launcher: Box::new(launcher),
            handler: None,
            last_status: None,
            cancel_on_shutdown: true,
            post_run: None,
        }
    }

    pub fn with_cancel_on_shutdown(mut self, cancel: bool) -> Self {
        self.cancel_on_shutdown = cancel;
        self
    }

    /// Run `hook` during shutdown if, and only if, the work completed.
    pub fn with_post_run<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut dyn ExecutionHandler) -> HookResult + Send + 'static,
    {
        self.post_run = Some(Box::new(hook));
        self
    }

    /// Last observed status; `None` until the work has been launched.
    pub fn disposition(&self) -> Option<ExecutionStatus> {
        self.last_status
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.handler.as_deref().map(|h| h.output_file())
    }

    pub fn handler_mut(&mut self) -> Option<&mut (dyn ExecutionHandler + 'static)> {
        self.handler.as_deref_mut()
    }

    fn refresh(&mut self) -> Option<ExecutionStatus> {
        let status = self.handler.as_mut()?.observe();
        if self.last_status != Some(status) {
            match self.last_status {
                Some(previous) => {
                    info!(work = %self.name, from = %previous, to = %status, "status changed")
                }
                None => info!(work = %self.name, %status, "initial status"),
            }
            self.last_status = Some(status);
        }
        Some(status)
    }
}

impl Service for WorkRunner {
    fn on_iteration(&mut self, ctx: &ServiceContext) -> HookResult {
        if self.handler.is_none() {
            let handler = (self.launcher)()?;
            info!(
                work = %self.name,
                output_file = %handler.output_file().display(),
                "launched work"
            );
            self.handler = Some(handler);
        }

        if let Some(status) = self.refresh() {
            ctx.send_update([("status", status.as_str())]);
        }
        Ok(())
    }

    fn can_shutdown(&mut self) -> HookResult<bool> {
        Ok(match self.refresh() {
            None => true,
            Some(status) => status.is_terminal() || status == ExecutionStatus::Unknown,
        })
    }

    fn on_shutdown(&mut self) -> HookResult {
        let Some(mut status) = self.refresh() else {
            debug!(work = %self.name, "nothing was launched");
            return Ok(());
        };

        let active = matches!(
            status,
            ExecutionStatus::Running | ExecutionStatus::Pending | ExecutionStatus::Held
        );
        if active {
            if self.cancel_on_shutdown {
                if let Some(handler) = self.handler.as_mut() {
                    handler.cancel()?;
                }
                status = self.refresh().unwrap_or(status);
            } else {
                warn!(work = %self.name, %status, "leaving work running at shutdown");
            }
        }

        let output_file = self
            .output_file()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        info!(work = %self.name, %status, %output_file, "final disposition");

        if status == ExecutionStatus::Completed {
            if let (Some(hook), Some(handler)) = (self.post_run.take(), self.handler.as_mut()) {
                hook(&mut **handler)?;
            }
        }
        Ok(())
    }
}
