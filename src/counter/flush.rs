//! Flush executor - drains pending counts into the counter store
//!
//! One flush cycle:
//! 1. Acquire a store connection (failure defers every enabled channel)
//! 2. For each enabled channel in ascending order: take-and-reset the
//!    pending count and append it to the ledger
//! 3. On a failed append, restore the value so the next cycle retries it
//! 4. Close the connection regardless of per-channel outcomes
//!
//! Delivery is at-least-once: counted events are never dropped, only
//! deferred.

use super::channels::{ChannelId, ChannelRegistry};
use super::db::CounterStore;
use std::sync::Arc;

/// Outcome of one flush cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub cycle: u64,
    /// Deltas durably appended to the ledger
    pub persisted: Vec<(ChannelId, u64)>,
    /// Deltas put back into the registry for the next cycle
    pub deferred: Vec<(ChannelId, u64)>,
    /// Channels with a zero delta that were not written
    pub skipped: Vec<ChannelId>,
    /// The store connection could not be acquired
    pub connect_failed: bool,
}

impl FlushReport {
    pub fn persisted_total(&self) -> u64 {
        self.persisted.iter().map(|(_, delta)| delta).sum()
    }

    pub fn deferred_total(&self) -> u64 {
        self.deferred.iter().map(|(_, delta)| delta).sum()
    }

    pub fn is_clean(&self) -> bool {
        !self.connect_failed && self.deferred.is_empty()
    }
}

pub struct FlushExecutor {
    registry: Arc<ChannelRegistry>,
    store: Arc<dyn CounterStore>,
    skip_zero_deltas: bool,
}

impl FlushExecutor {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        store: Arc<dyn CounterStore>,
        skip_zero_deltas: bool,
    ) -> Self {
        Self {
            registry,
            store,
            skip_zero_deltas,
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Run one flush cycle
    pub async fn flush(&self, cycle: u64) -> FlushReport {
        let mut report = FlushReport {
            cycle,
            ..FlushReport::default()
        };

        let mut conn = match self.store.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!(
                    "⚠️  Cycle {}: {} unavailable: {}",
                    cycle,
                    self.store.backend_type(),
                    e
                );
                // Nothing was taken, so every pending count stays for the next cycle.
                report.connect_failed = true;
                report.deferred = self
                    .registry
                    .enabled()
                    .map(|id| (id, self.registry.pending(id)))
                    .collect();
                return report;
            }
        };

        for id in self.registry.enabled() {
            let value = self.registry.take_and_reset(id);

            if value == 0 && self.skip_zero_deltas {
                report.skipped.push(id);
                continue;
            }

            match conn.upsert_delta(id, value).await {
                Ok(()) => {
                    log::debug!("Counter {} = {}", id, value);
                    report.persisted.push((id, value));
                }
                Err(e) => {
                    log::warn!(
                        "⚠️  Cycle {}: can't record counter {} (+{}): {}",
                        cycle,
                        id,
                        value,
                        e
                    );
                    self.registry.restore(id, value);
                    report.deferred.push((id, value));
                }
            }
        }

        if let Err(e) = conn.close().await {
            log::warn!("⚠️  Cycle {}: error closing store connection: {}", cycle, e);
        }

        report
    }
}
