// src/exec/local.rs

//! Execution handler for a command run as a direct child process.

use std::fs::File;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::Local;
use tokio::process::{Child, Command};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::errors::{Result, SimexecError};
use crate::exec::handler::ExecutionHandler;
use crate::exec::status::ExecutionStatus;

/// How long `cancel()` waits after the graceful terminate before killing.
pub const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// How a cancelled process actually went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Exited after the graceful terminate signal.
    Terminated,
    /// Did not exit within the timeout and was killed.
    Killed,
}

/// A command executed as a local child process, with stdout and stderr both
/// appended to [`output_file`](ExecutionHandler::output_file).
///
/// The command string is split on whitespace and executed directly, without a
/// shell. Each instance runs its command at most once.
///
/// While the process runs, this handler exclusively owns the child handle and
/// the output-file handle. The file handle is closed exactly once: on the
/// first observation of a terminal status, or by `cancel()`.
///
/// The child is a `tokio::process` child, so `start()` must run inside a
/// multi-threaded tokio runtime. `wait()` and `cancel()` block the calling
/// thread via `block_in_place`; other tasks keep running.
#[derive(Debug)]
pub struct LocalProcess {
    commands: String,
    run_path: PathBuf,
    output_file: Option<PathBuf>,
    default_output: PathBuf,
    default_name: String,
    cancel_timeout: Duration,

    child: Option<Child>,
    output_handle: Option<File>,
    exit_code: Option<i32>,
    cancelled: bool,
    cancel_outcome: Option<CancelOutcome>,
}

impl LocalProcess {
    /// Describe a process without starting it. Runs in the current working
    /// directory unless [`with_run_path`](Self::with_run_path) is used.
    pub fn new(commands: impl Into<String>) -> Self {
        let run_path = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let default_name = format!("simexec_process_{}", Local::now().format("%Y%m%d_%H%M%S"));
        let default_output = run_path.join(format!("{default_name}.out"));

        Self {
            commands: commands.into(),
            run_path,
            output_file: None,
            default_output,
            default_name,
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
            child: None,
            output_handle: None,
            exit_code: None,
            cancelled: false,
            cancel_outcome: None,
        }
    }

    /// Directory the command runs in. Also moves the default output file.
    pub fn with_run_path(mut self, run_path: impl Into<PathBuf>) -> Self {
        self.run_path = run_path.into();
        self.default_output = self.run_path.join(format!("{}.out", self.default_name));
        self
    }

    pub fn with_output_file(mut self, output_file: impl Into<PathBuf>) -> Self {
        self.output_file = Some(output_file.into());
        self
    }

    pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }

    pub fn commands(&self) -> &str {
        &self.commands
    }

    pub fn run_path(&self) -> &Path {
        &self.run_path
    }

    /// OS process id while the child is alive and owned.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Exit code once a terminal status has been observed. Processes ended
    /// by a signal report `-1`.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Whether the output-file handle is still held by this handler.
    pub fn holds_output_handle(&self) -> bool {
        self.output_handle.is_some()
    }

    /// How the last `cancel()` stopped the process, if it did.
    pub fn cancel_outcome(&self) -> Option<CancelOutcome> {
        self.cancel_outcome
    }

    /// Open the output file and spawn the command.
    ///
    /// stdin is a pipe; stdout and stderr both go to the output file. Errors
    /// are returned to the caller: there is no sensible default recovery for a
    /// command that cannot be spawned.
    pub fn start(&mut self) -> Result<()> {
        if self.child.is_some() || self.exit_code.is_some() || self.cancelled {
            return Err(SimexecError::AlreadyStarted(format!(
                "local process '{}' has already been started",
                self.commands
            )));
        }

        let mut parts = self.commands.split_whitespace();
        let program = parts.next().ok_or_else(|| SimexecError::SpawnError {
            command: self.commands.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

        runtime_handle()?;

        let output_path = self.output_file().to_path_buf();
        let output_error = |source| SimexecError::OutputFile {
            path: output_path.clone(),
            source,
        };
        let handle = File::create(&output_path).map_err(output_error)?;
        let stdout = handle.try_clone().map_err(output_error)?;
        let stderr = handle.try_clone().map_err(output_error)?;

        let child = Command::new(program)
            .args(parts)
            .current_dir(&self.run_path)
            .stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| SimexecError::SpawnError {
                command: self.commands.clone(),
                source,
            })?;

        info!(
            cmd = %self.commands,
            pid = child.id().unwrap_or_default(),
            run_path = %self.run_path.display(),
            output_file = %output_path.display(),
            "started local process"
        );

        self.child = Some(child);
        self.output_handle = Some(handle);
        Ok(())
    }

    /// Block until the process exits. Only valid while `Running`; otherwise
    /// logs why and returns immediately.
    pub fn wait(&mut self) -> Result<()> {
        let status = self.observe();
        if status != ExecutionStatus::Running {
            info!(cmd = %self.commands, %status, "cannot wait for process with status '{status}'");
            return Ok(());
        }

        let handle = runtime_handle()?;
        if let Some(child) = self.child.as_mut() {
            let exit = block_on(&handle, child.wait())?;
            self.record_exit(exit);
        }
        Ok(())
    }

    fn record_exit(&mut self, exit: ExitStatus) {
        let code = exit.code().unwrap_or(-1);
        info!(
            cmd = %self.commands,
            exit_code = code,
            success = exit.success(),
            "local process exited"
        );
        self.exit_code = Some(code);
        self.child = None;
        self.release_output();
    }

    fn release_output(&mut self) {
        if let Some(handle) = self.output_handle.take() {
            drop(handle);
            debug!(output_file = %self.output_file().display(), "closed output file handle");
        }
    }

    fn finished_status(&self) -> ExecutionStatus {
        match self.exit_code {
            None => ExecutionStatus::Unsubmitted,
            Some(0) => ExecutionStatus::Completed,
            Some(_) => ExecutionStatus::Failed,
        }
    }
}

fn runtime_handle() -> Result<Handle> {
    let handle = Handle::try_current().map_err(|e| {
        SimexecError::RuntimeError(format!("local processes need a tokio runtime: {e}"))
    })?;
    if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
        return Err(SimexecError::RuntimeError(
            "local processes need a multi-threaded tokio runtime".to_string(),
        ));
    }
    Ok(handle)
}

/// Run `fut` to completion from synchronous code without parking a runtime
/// worker.
fn block_on<F: Future>(handle: &Handle, fut: F) -> F::Output {
    tokio::task::block_in_place(|| handle.block_on(fut))
}

/// SIGTERM, then a bounded wait, then SIGKILL.
async fn stop_child(
    child: &mut Child,
    grace: Duration,
    cmd: &str,
) -> (Option<ExitStatus>, CancelOutcome) {
    match terminate(child) {
        Ok(()) => match timeout(grace, child.wait()).await {
            Ok(Ok(exit)) => return (Some(exit), CancelOutcome::Terminated),
            Ok(Err(e)) => {
                warn!(%cmd, error = %e, "error while waiting for terminated process");
            }
            Err(_) => {
                warn!(
                    %cmd,
                    timeout_ms = grace.as_millis() as u64,
                    "process did not terminate in time; killing"
                );
            }
        },
        Err(e) => warn!(%cmd, error = %e, "failed to send terminate signal"),
    }

    if let Err(e) = child.kill().await {
        warn!(%cmd, error = %e, "failed to kill child process");
    }
    (child.wait().await.ok(), CancelOutcome::Killed)
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = child
        .id()
        .ok_or_else(|| std::io::Error::other("process has already been reaped"))?;
    let pid = i32::try_from(pid).map_err(std::io::Error::other)?;
    kill(Pid::from_raw(pid), Signal::SIGTERM)?;
    Ok(())
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

impl ExecutionHandler for LocalProcess {
    fn observe(&mut self) -> ExecutionStatus {
        if self.cancelled {
            return ExecutionStatus::Cancelled;
        }

        let Some(child) = self.child.as_mut() else {
            return self.finished_status();
        };

        match child.try_wait() {
            Ok(None) => ExecutionStatus::Running,
            Ok(Some(exit)) => {
                self.record_exit(exit);
                self.finished_status()
            }
            Err(e) => {
                warn!(cmd = %self.commands, error = %e, "unable to query local process state");
                ExecutionStatus::Unknown
            }
        }
    }

    fn output_file(&self) -> &Path {
        self.output_file.as_deref().unwrap_or(&self.default_output)
    }

    /// Terminate gracefully, escalating to kill after the cancel timeout.
    fn cancel(&mut self) -> Result<()> {
        let status = self.observe();
        if status != ExecutionStatus::Running {
            info!(cmd = %self.commands, %status, "cannot cancel process with status '{status}'");
            return Ok(());
        }
        let handle = runtime_handle()?;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        info!(
            cmd = %self.commands,
            pid = child.id().unwrap_or_default(),
            "cancelling local process"
        );
        let (exit, outcome) = block_on(
            &handle,
            stop_child(&mut child, self.cancel_timeout, &self.commands),
        );

        self.exit_code = Some(exit.and_then(|e| e.code()).unwrap_or(-1));
        self.release_output();
        self.cancelled = true;
        self.cancel_outcome = Some(outcome);
        info!(cmd = %self.commands, ?outcome, "local process cancelled");
        Ok(())
    }
}
