//! Integration tests for the count -> flush -> ledger path
//!
//! Key behaviors tested:
//! - Healthy store receives exactly one write per enabled channel
//! - Store outage keeps pending counts for the next cycle
//! - Per-channel write failures are deferred, not dropped
//! - Recorded + pending always equals generated events

mod common;

#[cfg(test)]
mod flush_cycle_tests {
    use super::common::MemoryStore;
    use gpio_tally::counter::{
        ChannelId, ChannelRegistry, EdgeDetector, EdgeMode, FlushExecutor, SqliteCounterStore,
    };
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ch(id: u8) -> ChannelId {
        ChannelId::new(id).unwrap()
    }

    /// Registry with channels 2 and 5 enabled, after 3 flips on pin 2 and
    /// 1 flip on pin 5 (plus noise on disabled pins)
    fn counted_registry() -> Arc<ChannelRegistry> {
        let mut registry = ChannelRegistry::new();
        registry.enable(2);
        registry.enable(5);
        let registry = Arc::new(registry);

        let mut detector = EdgeDetector::new(EdgeMode::Both, 0b0000_0000);
        for sample in [0b0000_0100, 0b0000_0000, 0b1010_0100, 0b0010_0100] {
            detector.observe(sample, &registry);
        }
        registry
    }

    #[tokio::test]
    async fn test_healthy_store_gets_one_write_per_channel() {
        let registry = counted_registry();
        assert_eq!(registry.pending(ch(2)), 3);
        assert_eq!(registry.pending(ch(5)), 1);

        let store = MemoryStore::default();
        let executor = FlushExecutor::new(registry.clone(), Arc::new(store.clone()), false);

        let report = executor.flush(1).await;

        assert_eq!(store.writes(), vec![(2, 3), (5, 1)]);
        assert!(report.is_clean());
        assert_eq!(registry.pending(ch(2)), 0);
        assert_eq!(registry.pending(ch(5)), 0);

        let state = store.state.lock().unwrap();
        assert_eq!(state.connects, 1);
        assert_eq!(state.closes, 1);
    }

    #[tokio::test]
    async fn test_store_outage_keeps_counts_for_next_cycle() {
        let registry = counted_registry();
        let store = MemoryStore::default();
        store.set_offline(true);
        let executor = FlushExecutor::new(registry.clone(), Arc::new(store.clone()), false);

        let report = executor.flush(1).await;

        assert!(report.connect_failed);
        assert!(report.persisted.is_empty());
        assert_eq!(report.deferred, vec![(ch(2), 3), (ch(5), 1)]);
        assert!(store.writes().is_empty());
        assert_eq!(registry.pending(ch(2)), 3);
        assert_eq!(registry.pending(ch(5)), 1);

        // More pulses arrive, then the store comes back
        registry.add(ch(2), 2);
        store.set_offline(false);
        let report = executor.flush(2).await;

        assert!(report.is_clean());
        assert_eq!(store.writes(), vec![(2, 5), (5, 1)]);
        assert_eq!(registry.total_pending(), 0);
    }

    #[tokio::test]
    async fn test_rejected_channel_retried_next_cycle() {
        let registry = counted_registry();
        let store = MemoryStore::default();
        store.reject(2, true);
        let executor = FlushExecutor::new(registry.clone(), Arc::new(store.clone()), false);

        let report = executor.flush(1).await;
        assert_eq!(report.deferred, vec![(ch(2), 3)]);
        assert_eq!(store.writes(), vec![(5, 1)]);
        assert_eq!(registry.pending(ch(2)), 3);

        store.reject(2, false);
        executor.flush(2).await;
        assert_eq!(store.writes(), vec![(5, 1), (2, 3), (5, 0)]);
    }

    #[tokio::test]
    async fn test_recorded_plus_pending_equals_generated() {
        // Test: interleave pulses with a flaky store over many cycles
        let mut registry = ChannelRegistry::new();
        for id in [0, 3, 7] {
            registry.enable(id);
        }
        let registry = Arc::new(registry);
        let store = MemoryStore::default();
        let executor = FlushExecutor::new(registry.clone(), Arc::new(store.clone()), false);
        let mut detector = EdgeDetector::new(EdgeMode::Both, 0);

        // Small LCG so the sequence is deterministic
        let mut seed: u32 = 0x1234_5678;
        let mut next = move || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            seed >> 8
        };

        let mut generated = [0u64; 8];
        let mut previous = 0u8;
        for cycle in 1..=50u64 {
            for _ in 0..(next() % 20) {
                let sample = (next() & 0xFF) as u8;
                let flipped = sample ^ previous;
                for bit in 0..8 {
                    if flipped & (1 << bit) != 0 {
                        generated[bit] += 1;
                    }
                }
                detector.observe(sample, &registry);
                previous = sample;
            }

            store.set_offline(next() % 4 == 0);
            store.reject(3, next() % 3 == 0);
            executor.flush(cycle).await;
        }

        for id in [0u8, 3, 7] {
            let recorded = store.total(id);
            let pending = registry.pending(ch(id));
            assert_eq!(recorded + pending, generated[id as usize], "channel {}", id);
        }
        for id in [1u8, 2, 4, 5, 6] {
            assert_eq!(store.total(id), 0);
            assert_eq!(registry.pending(ch(id)), 0);
        }
    }

    #[tokio::test]
    async fn test_sqlite_ledger_accumulates_across_cycles() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteCounterStore::at_path(dir.path().join("counters.db")));
        let registry = counted_registry();
        let executor = FlushExecutor::new(registry.clone(), store.clone(), false);

        executor.flush(1).await;
        registry.add(ch(2), 4);
        executor.flush(2).await;
        executor.flush(3).await;

        assert_eq!(store.latest_total(ch(2)).unwrap(), 7);
        assert_eq!(store.latest_total(ch(5)).unwrap(), 1);

        // Idle cycles still leave a row per channel
        let rows = store.rows(ch(5)).unwrap();
        let ledger: Vec<(i64, i64)> = rows.iter().map(|r| (r.value, r.cumul)).collect();
        assert_eq!(ledger, vec![(1, 1), (0, 1), (0, 1)]);
    }

    #[tokio::test]
    async fn test_sqlite_skip_zero_deltas() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteCounterStore::at_path(dir.path().join("counters.db")));
        let registry = counted_registry();
        let executor = FlushExecutor::new(registry.clone(), store.clone(), true);

        executor.flush(1).await;
        let report = executor.flush(2).await;

        assert_eq!(report.skipped, vec![ch(2), ch(5)]);
        assert_eq!(store.rows(ch(2)).unwrap().len(), 1);
        assert_eq!(store.rows(ch(5)).unwrap().len(), 1);
    }
}
