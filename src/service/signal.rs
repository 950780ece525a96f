// src/service/signal.rs

//! SIGINT / SIGTERM handling.
//!
//! Handlers are registered synchronously, when the runner is built or at the
//! latest when `execute()` starts. A signal delivered after that is buffered
//! until the spawned waiter picks it up and flips the runner's shutdown flag.

use std::fmt;

use tracing::info;

/// Which signal asked the service to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Registered signal handlers. Must be created inside a tokio runtime.
#[cfg(unix)]
#[derive(Debug)]
pub struct SignalListener {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next SIGINT or SIGTERM.
    pub async fn recv(&mut self) -> ShutdownSignal {
        let received = tokio::select! {
            _ = self.sigint.recv() => ShutdownSignal::Interrupt,
            _ = self.sigterm.recv() => ShutdownSignal::Terminate,
        };
        info!(signal = %received, "received shutdown signal");
        received
    }
}

#[cfg(not(unix))]
#[derive(Debug)]
pub struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> ShutdownSignal {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        info!(signal = %ShutdownSignal::Interrupt, "received shutdown signal");
        ShutdownSignal::Interrupt
    }
}
