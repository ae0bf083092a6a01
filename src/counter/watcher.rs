//! Input watcher - dedicated thread turning interrupts into channel counts
//!
//! The watcher blocks on `InputSource::wait_for_change`, runs every sample
//! through the `EdgeDetector`, and credits transitions to the registry. It
//! owns the wait half of the input source and hands it back through its
//! `JoinHandle`; interrupt control and close stay with the daemon.
//!
//! Exit conditions:
//! - shutdown requested (checked on every loop re-entry)
//! - wait error from the hardware: logged, shutdown marked as a fault.
//!   Once shutdown is under way the daemon closes the board to wake a
//!   blocked wait, so an error at that point is not a fault.

use super::channels::ChannelRegistry;
use super::edges::EdgeDetector;
use crate::hardware::{InputSource, WaitOutcome};
use crate::shutdown::Shutdown;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct InputWatcher<S: InputSource> {
    source: S,
    detector: EdgeDetector,
    registry: Arc<ChannelRegistry>,
    shutdown: Shutdown,
    wait_timeout: Option<Duration>,
}

impl<S: InputSource> InputWatcher<S> {
    /// `detector` must already hold the baseline sample read from `source`.
    pub fn new(
        source: S,
        detector: EdgeDetector,
        registry: Arc<ChannelRegistry>,
        shutdown: Shutdown,
        wait_timeout: Option<Duration>,
    ) -> Self {
        Self {
            source,
            detector,
            registry,
            shutdown,
            wait_timeout,
        }
    }

    /// Start the watcher on its own OS thread
    pub fn spawn(self) -> io::Result<JoinHandle<S>> {
        thread::Builder::new()
            .name("input-watcher".to_string())
            .spawn(move || self.run())
    }

    /// Run the watch loop on the current thread until shutdown
    pub fn run(mut self) -> S {
        log::info!(
            "👂 Input watcher started on {} (edges: {}, baseline: {:#010b})",
            self.source.describe(),
            self.detector.mode(),
            self.detector.last_inputs()
        );

        let mut samples = 0u64;
        while !self.shutdown.is_requested() {
            match self.source.wait_for_change(self.wait_timeout) {
                WaitOutcome::Changed(sample) => {
                    samples += 1;
                    let events = self.detector.observe(sample, &self.registry);
                    if events != 0 {
                        log::debug!("inputs {:#010b}, events on {:#010b}", sample, events);
                    }
                }
                WaitOutcome::TimedOut => {
                    // Expected whenever a wait timeout is configured.
                    log::debug!("interrupt wait timed out");
                }
                WaitOutcome::Error(e) if self.shutdown.is_requested() => {
                    log::debug!("interrupt wait ended during shutdown: {}", e);
                    break;
                }
                WaitOutcome::Error(e) => {
                    log::error!("❌ Interrupt error: {}", e);
                    self.shutdown.fail();
                    break;
                }
            }
        }

        log::info!("Input watcher exiting after {} samples", samples);
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::channels::ChannelId;
    use crate::counter::edges::EdgeMode;
    use crate::shutdown::ShutdownReason;
    use crate::hardware::{InputSource, ScriptFeed, ScriptedInputs};

    fn ch(id: u8) -> ChannelId {
        ChannelId::new(id).unwrap()
    }

    fn start(
        registry: Arc<ChannelRegistry>,
        shutdown: Shutdown,
    ) -> (JoinHandle<ScriptedInputs>, ScriptFeed) {
        let (mut source, feed) = ScriptedInputs::new("watcher-test", 0);
        let baseline = source.read_baseline().unwrap();
        source.control().enable_interrupts().unwrap();
        let watcher = InputWatcher::new(
            source,
            EdgeDetector::new(EdgeMode::Both, baseline),
            registry,
            shutdown,
            Some(Duration::from_millis(20)),
        );
        (watcher.spawn().unwrap(), feed)
    }

    #[test]
    fn test_watcher_counts_until_shutdown() {
        let registry = Arc::new(ChannelRegistry::with_enabled([ch(2), ch(5)]));
        let shutdown = Shutdown::new();
        let (handle, feed) = start(registry.clone(), shutdown.clone());

        feed.pulse(2, 3);
        feed.pulse(5, 1);
        feed.pulse(7, 4);

        wait_for_pending(&registry, 4);

        shutdown.request();
        let source = handle.join().unwrap();

        assert_eq!(registry.pending(ch(2)), 3);
        assert_eq!(registry.pending(ch(5)), 1);
        assert_eq!(registry.pending(ch(7)), 0);
        assert!(!shutdown.is_faulted());
        assert!(source.interrupts_enabled());
    }

    fn wait_for_pending(registry: &ChannelRegistry, expected: u64) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while registry.total_pending() < expected && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_counts_after_timed_out_waits() {
        let registry = Arc::new(ChannelRegistry::with_enabled([ch(1), ch(6)]));
        let shutdown = Shutdown::new();
        let (handle, feed) = start(registry.clone(), shutdown.clone());

        // Several 20ms waits time out before anything arrives
        thread::sleep(Duration::from_millis(150));
        assert!(!handle.is_finished());
        assert_eq!(registry.total_pending(), 0);

        feed.pulse(1, 2);
        feed.pulse(6, 1);
        wait_for_pending(&registry, 3);

        shutdown.request();
        handle.join().unwrap();

        assert_eq!(registry.pending(ch(1)), 2);
        assert_eq!(registry.pending(ch(6)), 1);
        assert!(!shutdown.is_faulted());
    }

    #[test]
    fn test_close_during_shutdown_is_not_a_fault() {
        let registry = Arc::new(ChannelRegistry::with_enabled([ch(0)]));
        let shutdown = Shutdown::new();
        let (mut source, _feed) = ScriptedInputs::new("watcher-test", 0);
        let baseline = source.read_baseline().unwrap();
        let control = source.control();
        control.enable_interrupts().unwrap();
        let watcher = InputWatcher::new(
            source,
            EdgeDetector::new(EdgeMode::Both, baseline),
            registry,
            shutdown.clone(),
            None,
        );
        let handle = watcher.spawn().unwrap();

        thread::sleep(Duration::from_millis(60));
        shutdown.request();
        control.close();
        handle.join().unwrap();

        assert_eq!(shutdown.reason(), Some(ShutdownReason::Requested));
    }

    #[test]
    fn test_wait_error_marks_fault() {
        let registry = Arc::new(ChannelRegistry::with_enabled([ch(0)]));
        let shutdown = Shutdown::new();
        let (handle, feed) = start(registry.clone(), shutdown.clone());

        feed.pulse(0, 1);
        feed.fail("bus fault");
        handle.join().unwrap();

        assert!(shutdown.is_requested());
        assert!(shutdown.is_faulted());
        assert_eq!(registry.pending(ch(0)), 1);
    }
}
