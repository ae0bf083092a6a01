//! Channel registry - per-input pending counters
//!
//! Eight channels, one per input pin of the expansion board. Each channel is
//! enabled (or not) from configuration before the registry is shared, and
//! owns a pending event count that the watcher thread increments and the
//! flush executor drains.
//!
//! All counter operations are single atomic instructions on a per-channel
//! `AtomicU64`, so `add`, `take_and_reset` and `restore` are linearizable
//! with respect to each other.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of input pins on the board
pub const CHANNEL_COUNT: usize = 8;

/// Identifier of one countable input line, always in `0..=7`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u8);

impl ChannelId {
    /// Returns `None` for ids outside `0..=7`
    pub fn new(id: u8) -> Option<Self> {
        if usize::from(id) < CHANNEL_COUNT {
            Some(Self(id))
        } else {
            None
        }
    }

    /// All channel ids in ascending order
    pub fn all() -> impl Iterator<Item = ChannelId> {
        (0..CHANNEL_COUNT as u8).map(ChannelId)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Bit mask of this channel inside an input sample
    pub fn mask(self) -> u8 {
        1 << self.0
    }

    fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Channel {
    enabled: bool,
    pending: AtomicU64,
}

/// Registry of the eight channels and their pending counts
///
/// Enabling takes `&mut self`: once the registry is wrapped in an `Arc` and
/// handed to the watcher and the flush executor, the enabled set is frozen.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: [Channel; CHANNEL_COUNT],
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with the given channels enabled
    pub fn with_enabled(ids: impl IntoIterator<Item = ChannelId>) -> Self {
        let mut registry = Self::new();
        for id in ids {
            registry.enable_channel(id);
        }
        registry
    }

    /// Mark a raw pin id as enabled. Ids outside `0..=7` are ignored.
    pub fn enable(&mut self, id: u8) {
        match ChannelId::new(id) {
            Some(channel) => self.enable_channel(channel),
            None => log::debug!("ignoring out-of-range channel id {}", id),
        }
    }

    pub fn enable_channel(&mut self, id: ChannelId) {
        self.channels[id.index()].enabled = true;
    }

    pub fn is_enabled(&self, id: ChannelId) -> bool {
        self.channels[id.index()].enabled
    }

    /// Enabled channels in ascending id order
    pub fn enabled(&self) -> impl Iterator<Item = ChannelId> + '_ {
        ChannelId::all().filter(move |id| self.is_enabled(*id))
    }

    /// Bit mask of all enabled channels
    pub fn enabled_mask(&self) -> u8 {
        self.enabled().fold(0, |mask, id| mask | id.mask())
    }

    /// Credit `n` events to a channel. No-op on disabled channels.
    pub fn add(&self, id: ChannelId, n: u64) {
        let channel = &self.channels[id.index()];
        if channel.enabled {
            channel.pending.fetch_add(n, Ordering::AcqRel);
        }
    }

    /// Atomically read the pending count and reset it to zero
    pub fn take_and_reset(&self, id: ChannelId) -> u64 {
        self.channels[id.index()].pending.swap(0, Ordering::AcqRel)
    }

    /// Merge a previously taken count back in (flush failure path)
    pub fn restore(&self, id: ChannelId, n: u64) {
        // Same path as add: a disabled channel never holds a count.
        self.add(id, n);
    }

    pub fn pending(&self, id: ChannelId) -> u64 {
        self.channels[id.index()].pending.load(Ordering::Acquire)
    }

    pub fn total_pending(&self) -> u64 {
        self.channels
            .iter()
            .map(|channel| channel.pending.load(Ordering::Acquire))
            .sum()
    }
}
