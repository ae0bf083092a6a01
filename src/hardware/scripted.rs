//! Channel-fed input source
//!
//! Samples are pushed through a `ScriptFeed` from any thread (a test, or the
//! replay reader) and delivered to the watcher as if they were interrupts.
//! Dropping every feed handle reads as the board disconnecting.

use super::{HardwareError, InputControl, InputSource, WaitOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Longest uninterrupted block inside one wait
const CLOSE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug)]
enum FeedEvent {
    Sample(u8),
    Fault(String),
}

/// Producer side of a `ScriptedInputs` source
#[derive(Debug, Clone)]
pub struct ScriptFeed {
    tx: Sender<FeedEvent>,
    level: Arc<Mutex<u8>>,
}

impl ScriptFeed {
    /// Deliver a full 8-bit sample. Returns false once the source is gone.
    pub fn push(&self, sample: u8) -> bool {
        if let Ok(mut level) = self.level.lock() {
            *level = sample;
        }
        self.tx.send(FeedEvent::Sample(sample)).is_ok()
    }

    /// Drive one pin and deliver the resulting sample
    pub fn set_level(&self, bit: u8, high: bool) -> bool {
        let sample = {
            let Ok(mut level) = self.level.lock() else {
                return false;
            };
            if high {
                *level |= 1 << (bit & 7);
            } else {
                *level &= !(1 << (bit & 7));
            }
            *level
        };
        self.tx.send(FeedEvent::Sample(sample)).is_ok()
    }

    /// Toggle a pin `count` times, one sample per toggle
    pub fn pulse(&self, bit: u8, count: usize) -> bool {
        let mask = 1 << (bit & 7);
        (0..count).all(|_| {
            let current = self.level.lock().map(|level| *level & mask != 0).unwrap_or(false);
            self.set_level(bit, !current)
        })
    }

    /// Make the next wait report a hardware fault
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.tx.send(FeedEvent::Fault(reason.into())).is_ok()
    }
}

/// Interrupt flag and close marker of a `ScriptedInputs` source
#[derive(Debug, Default)]
pub struct ScriptControl {
    interrupts: AtomicBool,
    closed: AtomicBool,
}

impl ScriptControl {
    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl InputControl for ScriptControl {
    fn enable_interrupts(&self) -> Result<(), HardwareError> {
        if self.is_closed() {
            return Err(HardwareError::Interrupts("input board closed".to_string()));
        }
        self.interrupts.store(true, Ordering::Release);
        Ok(())
    }

    fn disable_interrupts(&self) -> Result<(), HardwareError> {
        self.interrupts.store(false, Ordering::Release);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Input source whose interrupts come from a `ScriptFeed`
#[derive(Debug)]
pub struct ScriptedInputs {
    name: String,
    rx: Receiver<FeedEvent>,
    /// Level of the last delivered sample
    current: u8,
    control: Arc<ScriptControl>,
}

impl ScriptedInputs {
    /// Create a source whose pins start at `initial`
    pub fn new(name: impl Into<String>, initial: u8) -> (Self, ScriptFeed) {
        let (tx, rx) = mpsc::channel();
        let level = Arc::new(Mutex::new(initial));
        let source = Self {
            name: name.into(),
            rx,
            current: initial,
            control: Arc::new(ScriptControl::default()),
        };
        (source, ScriptFeed { tx, level })
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.control.interrupts_enabled()
    }

    /// Concrete control handle, for inspecting teardown
    pub fn script_control(&self) -> Arc<ScriptControl> {
        self.control.clone()
    }
}

impl InputSource for ScriptedInputs {
    /// Samples still queued in the feed are not part of the baseline.
    fn read_baseline(&mut self) -> Result<u8, HardwareError> {
        Ok(self.current)
    }

    fn control(&self) -> Arc<dyn InputControl> {
        self.control.clone()
    }

    fn wait_for_change(&mut self, timeout: Option<Duration>) -> WaitOutcome {
        if !self.control.interrupts_enabled() {
            let reason = "interrupts not enabled".to_string();
            return WaitOutcome::Error(HardwareError::Interrupts(reason));
        }

        // Wait in slices so a close from another thread is noticed
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        loop {
            if self.control.is_closed() {
                let reason = "input board closed".to_string();
                return WaitOutcome::Error(HardwareError::Disconnected(reason));
            }

            let slice = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return WaitOutcome::TimedOut;
                    }
                    left.min(CLOSE_POLL)
                }
                None => CLOSE_POLL,
            };

            match self.rx.recv_timeout(slice) {
                Ok(FeedEvent::Sample(sample)) => {
                    self.current = sample;
                    return WaitOutcome::Changed(sample);
                }
                Ok(FeedEvent::Fault(reason)) => {
                    return WaitOutcome::Error(HardwareError::Disconnected(reason))
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    let reason = "input feed closed".to_string();
                    return WaitOutcome::Error(HardwareError::Disconnected(reason));
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("scripted inputs ({})", self.name)
    }
}
