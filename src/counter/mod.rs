//! # Edge aggregation and drift-corrected flushing
//!
//! Input samples flow through four stages:
//! 1. `watcher` blocks on hardware change notifications (own OS thread)
//! 2. `edges` turns consecutive samples into per-pin transition events
//! 3. `channels` accumulates events into per-channel pending counts
//! 4. `scheduler` wakes on a fixed grid anchored to startup and runs
//!    `flush`, which drains pending counts into the `db` ledger
//!
//! A failed write never drops events: the taken value is restored into the
//! channel and goes out with the next cycle.
//!
//! ## Module Organization
//!
//! - `channels` - Channel ids and the shared pending-count registry
//! - `edges` - Transition detection modes
//! - `watcher` - Input watcher thread
//! - `flush` - Flush executor and per-cycle report
//! - `scheduler` - Drift-corrected flush loop
//! - `db` - Counter store traits and the SQLite ledger

pub mod channels;
pub mod db;
pub mod edges;
pub mod flush;
pub mod scheduler;
pub mod watcher;

// Re-export commonly used types
pub use channels::{ChannelId, ChannelRegistry, CHANNEL_COUNT};
pub use db::{CounterStore, SqliteCounterStore, StoreConnection, StoreError};
pub use edges::{EdgeDetector, EdgeMode};
pub use flush::{FlushExecutor, FlushReport};
pub use scheduler::{flush_scheduler_task, FlushSchedule};
pub use watcher::InputWatcher;
