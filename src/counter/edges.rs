//! Transition detection between consecutive input samples

use super::channels::{ChannelId, ChannelRegistry};
use std::fmt;
use std::str::FromStr;

/// Which level changes count as events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeMode {
    /// Every level change relative to the previous sample (0->1 and 1->0)
    #[default]
    Both,
    /// Only 0->1 changes relative to the previous sample
    Rising,
    /// Only bits that differ from the startup baseline AND from the
    /// previous sample, i.e. transitions away from the resting level
    Baseline,
}

impl FromStr for EdgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "both" => Ok(EdgeMode::Both),
            "rising" => Ok(EdgeMode::Rising),
            "baseline" => Ok(EdgeMode::Baseline),
            other => Err(format!(
                "unknown edge mode '{}' (expected both, rising or baseline)",
                other
            )),
        }
    }
}

impl fmt::Display for EdgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeMode::Both => "both",
            EdgeMode::Rising => "rising",
            EdgeMode::Baseline => "baseline",
        };
        f.write_str(name)
    }
}

/// Sample history of the watcher: the baseline read at startup and the most
/// recent sample
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    mode: EdgeMode,
    base_inputs: u8,
    last_inputs: u8,
}

impl EdgeDetector {
    /// The baseline also seeds the previous-sample slot.
    pub fn new(mode: EdgeMode, baseline: u8) -> Self {
        Self {
            mode,
            base_inputs: baseline,
            last_inputs: baseline,
        }
    }

    pub fn mode(&self) -> EdgeMode {
        self.mode
    }

    pub fn last_inputs(&self) -> u8 {
        self.last_inputs
    }

    /// Bits of `sample` that count as an event under the current mode.
    /// Does not update the stored sample.
    pub fn events(&self, sample: u8) -> u8 {
        let changed = sample ^ self.last_inputs;
        match self.mode {
            EdgeMode::Both => changed,
            EdgeMode::Rising => changed & sample,
            EdgeMode::Baseline => changed & (sample ^ self.base_inputs),
        }
    }

    /// Credit the events in `sample` to the registry and remember the sample.
    /// Returns the event mask (all bits, enabled or not).
    pub fn observe(&mut self, sample: u8, registry: &ChannelRegistry) -> u8 {
        let events = self.events(sample);
        if events != 0 {
            for id in ChannelId::all().filter(|id| events & id.mask() != 0) {
                log::trace!("pin {} changed", id);
                registry.add(id, 1);
            }
        }
        // Updated even when nothing counted, so repeated notifications of the
        // same level stay idempotent.
        self.last_inputs = sample;
        events
    }
}
