//! Cooperative shutdown shared by the watcher thread and the flush scheduler

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why the daemon stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Requested from outside (SIGINT, SIGTERM, caller)
    Requested,
    /// The input watcher hit an unrecoverable hardware error
    HardwareFault,
}

/// Shared stop flag. Cloning hands out another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    faulted: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask both loops to stop at their next boundary
    pub fn request(&self) {
        self.token.cancel();
    }

    /// Stop because of a fatal runtime error; the process exits with failure
    pub fn fail(&self) {
        self.faulted.store(true, Ordering::Release);
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        if self.is_faulted() {
            Some(ShutdownReason::HardwareFault)
        } else if self.is_requested() {
            Some(ShutdownReason::Requested)
        } else {
            None
        }
    }

    /// Resolves once shutdown has been requested
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Install SIGINT/SIGTERM handlers that request shutdown.
///
/// Registration errors are returned so the caller can treat them as fatal.
#[cfg(unix)]
pub fn listen_for_signals(shutdown: Shutdown) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => log::warn!("⚠️  Received SIGINT, shutting down..."),
            _ = sigterm.recv() => log::warn!("⚠️  Received SIGTERM, shutting down..."),
            _ = shutdown.cancelled() => return,
        }
        shutdown.request();
    }))
}

#[cfg(not(unix))]
pub fn listen_for_signals(shutdown: Shutdown) -> std::io::Result<tokio::task::JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => log::warn!("⚠️  Received CTRL+C, shutting down..."),
                Err(e) => log::error!("❌ Failed to listen for CTRL+C: {}", e),
            },
            _ = shutdown.cancelled() => return,
        }
        shutdown.request();
    }))
}
