//! Flush scheduler - drift-corrected periodic flushing
//!
//! Wake times are anchored to the process start: cycle `n` is due at
//! `start + interval * n`. Each sleep is recomputed from that origin, so time
//! spent flushing (or oversleeping) is absorbed by the next sleep instead of
//! accumulating as drift. Sleeps are truncated to whole seconds.
//!
//! The sleep races the shutdown token. When shutdown arrives the cycle in
//! progress completes right away with a final flush, then the scheduler
//! stops. Every run therefore ends with at least one flush.

use super::flush::{FlushExecutor, FlushReport};
use crate::shutdown::Shutdown;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Cycle counter and wake-time arithmetic, anchored to `start`
#[derive(Debug, Clone)]
pub struct FlushSchedule {
    start: Instant,
    interval: Duration,
    cycle: u64,
}

impl FlushSchedule {
    pub fn new(start: Instant, interval: Duration) -> Self {
        Self {
            start,
            interval,
            cycle: 0,
        }
    }

    /// Number of the current (last started) cycle
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Nominal wake time of cycle `n`, `None` past the clock's range
    pub fn target(&self, n: u64) -> Option<Instant> {
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        self.start.checked_add(self.interval.saturating_mul(n))
    }

    /// Start the next cycle and return how long to sleep from `now`
    pub fn advance(&mut self, now: Instant) -> Duration {
        self.cycle += 1;
        let remaining = match self.target(self.cycle) {
            Some(target) => target.saturating_duration_since(now),
            None => self.interval,
        };
        Duration::from_secs(remaining.as_secs())
    }
}

/// Scheduler state, logged on transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Waiting,
    Flushing,
    Stopped,
}

/// Run flush cycles until shutdown. Returns the reports of every cycle.
pub async fn flush_scheduler_task(
    executor: FlushExecutor,
    mut schedule: FlushSchedule,
    shutdown: Shutdown,
) -> Vec<FlushReport> {
    log::info!("⏰ Starting flush scheduler (interval: {}s)", schedule.interval().as_secs());

    let mut reports = Vec::new();
    let mut state = SchedulerState::Waiting;

    loop {
        let sleep_for = schedule.advance(Instant::now());
        log::debug!("cycle {}: {:?}, sleeping {}s", schedule.cycle(), state, sleep_for.as_secs());

        let stopping = tokio::select! {
            _ = sleep(sleep_for) => shutdown.is_requested(),
            _ = shutdown.cancelled() => {
                log::info!("Shutdown during cycle {}, running final flush", schedule.cycle());
                true
            }
        };

        state = SchedulerState::Flushing;
        log::debug!("cycle {}: {:?}", schedule.cycle(), state);
        let report = executor.flush(schedule.cycle()).await;
        log_report(&report, executor.registry().total_pending());
        reports.push(report);

        if stopping || shutdown.is_requested() {
            break;
        }
        state = SchedulerState::Waiting;
    }

    state = SchedulerState::Stopped;
    log::info!("Flush scheduler {:?} after {} cycles", state, schedule.cycle());
    reports
}

fn log_report(report: &FlushReport, still_pending: u64) {
    if report.connect_failed {
        log::warn!(
            "⚠️  Cycle {}: store unreachable, {} events kept for next cycle",
            report.cycle,
            report.deferred_total()
        );
    } else if report.deferred.is_empty() {
        log::info!(
            "✅ Cycle {}: recorded {} events on {} channels",
            report.cycle,
            report.persisted_total(),
            report.persisted.len()
        );
    } else {
        log::warn!(
            "⚠️  Cycle {}: recorded {} events, deferred {} on {} channels",
            report.cycle,
            report.persisted_total(),
            report.deferred_total(),
            report.deferred.len()
        );
    }
    log::debug!("cycle {}: {} events pending after flush", report.cycle, still_pending);
}
