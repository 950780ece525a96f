// src/exec/tail.rs

//! Live tail of a handler's output file, behind
//! [`ExecutionHandler::updates`](crate::exec::ExecutionHandler::updates).
//!
//! The function is generic over the output writer, the confirmation reader and
//! the interrupt future so tests can drive it without a terminal.

use std::future::Future;
use std::io::SeekFrom;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::errors::{Result, SimexecError};
use crate::exec::handler::ExecutionHandler;
use crate::exec::status::ExecutionStatus;

/// Delay between polls of the output file when no new line is available.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for [`stream_updates`].
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// How long to stream for; `Duration::ZERO` means until the status leaves
    /// `Running`.
    pub duration: Duration,
    /// Ask before streaming indefinitely.
    pub confirm_indefinite: bool,
    pub poll_interval: Duration,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            confirm_indefinite: true,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Resolves when the user presses Ctrl-C. If the handler cannot be installed
/// the future never resolves.
pub async fn ctrl_c_interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Stream lines appended to `handler.output_file()` into `out`.
///
/// - Not running: write a notice (pointing at the output file for finished
///   work) and return without opening anything.
/// - Running: open the file, seek to its end and echo new lines until the
///   duration elapses or, for indefinite streaming, the status leaves
///   `Running`.
/// - `interrupt` resolving stops the stream with a notice.
pub async fn stream_updates<H, W, R, I>(
    handler: &mut H,
    options: UpdateOptions,
    out: &mut W,
    input: &mut R,
    interrupt: I,
) -> Result<()>
where
    H: ExecutionHandler + ?Sized,
    W: AsyncWrite + Unpin + Send,
    R: AsyncBufRead + Unpin + Send,
    I: Future<Output = ()> + Send,
{
    let status = handler.observe();
    if status != ExecutionStatus::Running {
        let path = handler.output_file().to_path_buf();
        let mut notice = format!(
            "This job is currently not running ({status}). Live updates cannot be provided.\n"
        );
        let has_output = matches!(status, ExecutionStatus::Completed | ExecutionStatus::Failed)
            || (status == ExecutionStatus::Cancelled && path.exists());
        if has_output {
            let shown = std::fs::canonicalize(&path).unwrap_or(path);
            notice.push_str(&format!("See {} for job output\n", shown.display()));
        }
        out.write_all(notice.as_bytes()).await?;
        out.flush().await?;
        return Ok(());
    }

    let indefinite = options.duration.is_zero();
    if indefinite && options.confirm_indefinite && !confirm(out, input).await? {
        debug!("indefinite updates declined");
        return Ok(());
    }

    let path = handler.output_file().to_path_buf();
    let file = File::open(&path)
        .await
        .map_err(|source| SimexecError::OutputFile {
            path: path.clone(),
            source,
        })?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::End(0)).await?;

    let started = Instant::now();
    let follow = async {
        let mut line = String::new();
        loop {
            if !indefinite && started.elapsed() >= options.duration {
                break;
            }
            line.clear();
            let read = reader.read_line(&mut line).await?;
            if read > 0 {
                out.write_all(line.as_bytes()).await?;
                out.flush().await?;
                continue;
            }
            if indefinite && handler.observe() != ExecutionStatus::Running {
                break;
            }
            sleep(options.poll_interval).await;
        }
        Ok::<(), SimexecError>(())
    };

    let finished = tokio::select! {
        res = follow => Some(res),
        _ = interrupt => None,
    };

    match finished {
        Some(res) => res,
        None => {
            out.write_all(b"\nLive status updates stopped by user.\n").await?;
            out.flush().await?;
            Ok(())
        }
    }
}

async fn confirm<W, R>(out: &mut W, input: &mut R) -> Result<bool>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncBufRead + Unpin + Send,
{
    out.write_all(
        b"This will provide indefinite updates to your job. You can stop it anytime using Ctrl+C. \
          Do you want to continue? (y/n): ",
    )
    .await?;
    out.flush().await?;

    let mut answer = String::new();
    input.read_line(&mut answer).await?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
