//! Shared test doubles

use async_trait::async_trait;
use gpio_tally::counter::{ChannelId, CounterStore, StoreConnection, StoreError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MemoryState {
    /// Refuse connections while set
    pub offline: bool,
    /// Channels whose writes fail
    pub rejected: HashSet<u8>,
    /// Successful writes in call order
    pub writes: Vec<(u8, u64)>,
    pub connects: u32,
    pub closes: u32,
}

/// In-memory ledger whose availability is switchable per test step
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub state: Arc<Mutex<MemoryState>>,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn reject(&self, channel: u8, rejected: bool) {
        let mut state = self.state.lock().unwrap();
        if rejected {
            state.rejected.insert(channel);
        } else {
            state.rejected.remove(&channel);
        }
    }

    pub fn writes(&self) -> Vec<(u8, u64)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn total(&self, channel: u8) -> u64 {
        self.writes()
            .iter()
            .filter(|(id, _)| *id == channel)
            .map(|(_, delta)| delta)
            .sum()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(StoreError::Connect("connection refused".to_string()));
        }
        state.connects += 1;
        Ok(Box::new(MemoryConnection {
            state: self.state.clone(),
        }))
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn upsert_delta(&mut self, channel: ChannelId, delta: u64) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.rejected.contains(&channel.get()) {
            return Err(StoreError::Database("insert failed".to_string()));
        }
        state.writes.push((channel.get(), delta));
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}
