//! Daemon wiring: startup sequence, run loop and clean shutdown
//!
//! Startup (any failure is fatal, nothing runs partially):
//! 1. Build the channel registry from configuration
//! 2. Read the baseline sample
//! 3. Enable interrupts
//! 4. Spawn the input watcher thread
//! 5. Anchor the flush schedule to the current time
//!
//! Shutdown: the scheduler finishes its final flush, the watcher is joined
//! (bounded by the grace period), interrupts are disabled and the board is
//! closed. Teardown goes through the board's control handle, so it runs even
//! when the watcher is still blocked in a wait. Store connections never
//! outlive a flush cycle.

use crate::config::{ConfigError, CounterConfig};
use crate::counter::channels::ChannelRegistry;
use crate::counter::db::CounterStore;
use crate::counter::edges::EdgeDetector;
use crate::counter::flush::{FlushExecutor, FlushReport};
use crate::counter::scheduler::{flush_scheduler_task, FlushSchedule};
use crate::counter::watcher::InputWatcher;
use crate::hardware::{HardwareError, InputControl, InputSource};
use crate::shutdown::{Shutdown, ShutdownReason};
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub enum StartupError {
    Config(ConfigError),
    Hardware(HardwareError),
    /// Input feed or signal handler could not be set up
    Io(String, io::Error),
    /// The watcher thread could not be created
    Thread(io::Error),
}

impl From<ConfigError> for StartupError {
    fn from(err: ConfigError) -> Self {
        StartupError::Config(err)
    }
}

impl From<HardwareError> for StartupError {
    fn from(err: HardwareError) -> Self {
        StartupError::Hardware(err)
    }
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Config(e) => write!(f, "Configuration error: {}", e),
            StartupError::Hardware(e) => write!(f, "Hardware error: {}", e),
            StartupError::Io(what, e) => write!(f, "Can't {}: {}", what, e),
            StartupError::Thread(e) => write!(f, "Can't create watcher thread: {}", e),
        }
    }
}

impl std::error::Error for StartupError {}

/// What happened between startup and exit
#[derive(Debug)]
pub struct DaemonOutcome {
    pub reason: ShutdownReason,
    pub reports: Vec<FlushReport>,
    /// Events counted but never recorded (lost at exit)
    pub pending_at_exit: u64,
    /// False when the watcher was still blocked after the grace period
    pub watcher_joined: bool,
}

impl DaemonOutcome {
    pub fn is_success(&self) -> bool {
        self.reason == ShutdownReason::Requested
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Counting daemon bound to one configuration and one counter store
pub struct Daemon {
    config: CounterConfig,
    registry: Arc<ChannelRegistry>,
    store: Arc<dyn CounterStore>,
}

impl Daemon {
    pub fn new(config: CounterConfig, store: Arc<dyn CounterStore>) -> Self {
        let registry = Arc::new(ChannelRegistry::with_enabled(config.channels.iter().copied()));
        Self {
            config,
            registry,
            store,
        }
    }

    /// Shared pending counters (read-only observation)
    pub fn registry(&self) -> Arc<ChannelRegistry> {
        self.registry.clone()
    }

    /// Run until `shutdown` fires
    pub async fn run<S: InputSource>(
        &self,
        mut source: S,
        shutdown: Shutdown,
    ) -> Result<DaemonOutcome, StartupError> {
        let config = &self.config;
        if self.registry.enabled().next().is_none() {
            log::warn!("No valid counter inputs enabled, nothing will be counted");
        }

        let baseline = source.read_baseline()?;
        log::info!("📥 Initial inputs: {:#010b}", baseline);

        let control = source.control();
        control.enable_interrupts()?;
        log::info!("✅ Interrupts enabled on {}", source.describe());
        // From here on every exit path disables interrupts and closes the board
        let mut teardown = HardwareTeardown::new(control);

        let watcher = InputWatcher::new(
            source,
            EdgeDetector::new(config.edge_mode, baseline),
            self.registry.clone(),
            shutdown.clone(),
            config.watch_timeout,
        );
        let handle = watcher.spawn().map_err(StartupError::Thread)?;

        let executor = FlushExecutor::new(
            self.registry.clone(),
            self.store.clone(),
            config.skip_zero_deltas,
        );
        let schedule = FlushSchedule::new(Instant::now(), config.flush_interval);
        log::info!("🚀 Main loop started");

        let reports = flush_scheduler_task(executor, schedule, shutdown.clone()).await;

        let grace = config.shutdown_grace;
        let mut finished = watcher_finished(&handle, grace).await;
        teardown.release();
        if !finished {
            log::warn!(
                "⚠️  Input watcher still blocked after {:?}, board closed under it",
                grace
            );
            finished = watcher_finished(&handle, grace).await;
        }

        let watcher_joined = if finished {
            match handle.join() {
                Ok(_) => true,
                Err(_) => {
                    log::error!("❌ Input watcher thread panicked");
                    false
                }
            }
        } else {
            log::warn!("⚠️  Leaving input watcher thread behind");
            false
        };

        let pending_at_exit = self.registry.total_pending();
        if pending_at_exit > 0 {
            log::warn!("⚠️  {} counted events were not recorded before exit", pending_at_exit);
        }

        let reason = shutdown.reason().unwrap_or(ShutdownReason::Requested);
        match reason {
            ShutdownReason::Requested => log::info!("✅ Clean exit"),
            ShutdownReason::HardwareFault => log::error!("❌ Stopped after input hardware fault"),
        }

        Ok(DaemonOutcome {
            reason,
            reports,
            pending_at_exit,
            watcher_joined,
        })
    }
}

/// Poll until the watcher thread has finished, for at most `grace`
async fn watcher_finished<T>(handle: &JoinHandle<T>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}

/// Disables interrupts and closes the board once, on `release` or on drop
struct HardwareTeardown {
    control: Arc<dyn InputControl>,
    released: bool,
}

impl HardwareTeardown {
    fn new(control: Arc<dyn InputControl>) -> Self {
        Self {
            control,
            released: false,
        }
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        match self.control.disable_interrupts() {
            Ok(()) => log::info!("Interrupts disabled"),
            Err(e) => log::warn!("⚠️  Can't disable interrupts: {}", e),
        }
        self.control.close();
        log::info!("Input board closed");
    }
}

impl Drop for HardwareTeardown {
    fn drop(&mut self) {
        self.release();
    }
}
