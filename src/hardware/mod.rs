//! Hardware input boundary
//!
//! The expansion board is reached through the `InputSource` trait. Bus setup
//! for a physical board lives behind an implementation of this trait; the
//! crate ships a channel-fed `ScriptedInputs` source and a line-oriented
//! replay feed built on top of it.

pub mod replay;
pub mod scripted;

pub use scripted::{ScriptControl, ScriptFeed, ScriptedInputs};

use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// The board (or the feed standing in for it) could not be opened
    Open(String),
    /// Interrupt delivery could not be switched on or off
    Interrupts(String),
    /// A register read failed
    Read(String),
    /// The board went away while waiting for a change
    Disconnected(String),
}

impl std::fmt::Display for HardwareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareError::Open(e) => write!(f, "can't open input board: {}", e),
            HardwareError::Interrupts(e) => write!(f, "interrupt control failed: {}", e),
            HardwareError::Read(e) => write!(f, "input read failed: {}", e),
            HardwareError::Disconnected(e) => write!(f, "input board disconnected: {}", e),
        }
    }
}

impl std::error::Error for HardwareError {}

/// Result of one blocking wait for an input change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A fresh 8-bit pin-state sample
    Changed(u8),
    /// No notification within the timeout
    TimedOut,
    /// Interrupt wait failed; there is no recovery path
    Error(HardwareError),
}

/// Interrupt switch and release of a board.
///
/// Shared between the daemon and the watcher thread, so every method takes
/// `&self` and must be callable while another thread is blocked in
/// `InputSource::wait_for_change`.
pub trait InputControl: Send + Sync {
    fn enable_interrupts(&self) -> Result<(), HardwareError>;

    fn disable_interrupts(&self) -> Result<(), HardwareError>;

    /// Release the board. A wait blocked on it returns with an error.
    fn close(&self) {}
}

/// An 8-pin digital input board with change interrupts
pub trait InputSource: Send + 'static {
    /// Read the input register directly, before interrupts are enabled
    fn read_baseline(&mut self) -> Result<u8, HardwareError>;

    /// Handle for interrupt control and teardown, kept by the daemon
    fn control(&self) -> Arc<dyn InputControl>;

    /// Block until the inputs change. `None` waits forever.
    fn wait_for_change(&mut self, timeout: Option<Duration>) -> WaitOutcome;

    /// Short description for logs
    fn describe(&self) -> String;
}
