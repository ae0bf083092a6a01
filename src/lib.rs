//! gpio-tally: counts level transitions on the eight inputs of a GPIO
//! expansion board and periodically appends the per-channel deltas to a
//! cumulative ledger in a relational store.

pub mod config;
pub mod counter;
pub mod daemon;
pub mod hardware;
pub mod shutdown;
