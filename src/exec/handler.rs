// src/exec/handler.rs

//! Uniform monitoring interface over a unit of submitted work.
//!
//! The orchestrator (or a [`Service`](crate::service::Service) polling from
//! `on_iteration`) talks to an `ExecutionHandler` without knowing whether the
//! work is a local child process or a batch-scheduler job.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::BufReader;

use crate::errors::Result;
use crate::exec::status::ExecutionStatus;
use crate::exec::tail::{UpdateOptions, ctrl_c_interrupt, stream_updates};

/// Trait implemented by everything that can be submitted, polled, streamed
/// and cancelled.
pub trait ExecutionHandler: Send {
    /// Re-derive the current status from the underlying process or scheduler.
    ///
    /// Never returns a cached value the caller has to invalidate. Implementations
    /// may release resources the first time a terminal status is observed
    /// (e.g. [`LocalProcess`](crate::exec::LocalProcess) closes its output
    /// file); repeated observations must be idempotent.
    fn observe(&mut self) -> ExecutionStatus;

    /// Append-only log the underlying work writes to.
    fn output_file(&self) -> &Path;

    /// Stop the work if it can be stopped. Calling this on work that is not
    /// cancellable is a logged no-op, not an error. May block for up to the
    /// handler's cancel timeout.
    fn cancel(&mut self) -> Result<()>;

    /// Stream newly appended lines of [`output_file`](Self::output_file) to
    /// stdout for `duration` (`Duration::ZERO` = until the status leaves
    /// `Running`).
    ///
    /// When indefinite streaming is requested and `confirm_indefinite` is true,
    /// the user is asked on stdin first. Ctrl-C stops the stream cleanly.
    fn updates(
        &mut self,
        duration: Duration,
        confirm_indefinite: bool,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let options = UpdateOptions {
                duration,
                confirm_indefinite,
                ..UpdateOptions::default()
            };
            let mut stdout = tokio::io::stdout();
            let mut stdin = BufReader::new(tokio::io::stdin());
            stream_updates(self, options, &mut stdout, &mut stdin, ctrl_c_interrupt()).await
        })
    }
}

impl<H: ExecutionHandler + ?Sized> ExecutionHandler for Box<H> {
    fn observe(&mut self) -> ExecutionStatus {
        (**self).observe()
    }

    fn output_file(&self) -> &Path {
        (**self).output_file()
    }

    fn cancel(&mut self) -> Result<()> {
        (**self).cancel()
    }

    fn updates(
        &mut self,
        duration: Duration,
        confirm_indefinite: bool,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        (**self).updates(duration, confirm_indefinite)
    }
}
