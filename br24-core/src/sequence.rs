//! Spoke sequence tracking and receive statistics.

use serde::Serialize;

use crate::protocol::SPOKES_RAW;

/// Counters kept while receiving. They only ever go up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceiveStatistics {
    pub packets: u64,
    pub spokes: u64,
    /// Estimate from gaps in the spoke sequence
    pub missing_spokes: u64,
    /// Frames with a short or odd-sized payload
    pub broken_packets: u64,
    /// Spokes with an unexpected status byte
    pub broken_spokes: u64,
    pub rotations: u64,
}

impl ReceiveStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full_rotation(&mut self) {
        self.rotations += 1;
    }
}

impl std::fmt::Display for ReceiveStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} packets, {} spokes, {} missing spokes, {} broken packets, {} broken spokes, {} rotations",
            self.packets,
            self.spokes,
            self.missing_spokes,
            self.broken_packets,
            self.broken_spokes,
            self.rotations
        )
    }
}

/// Tracks the next expected spoke number on the 4096 circle.
///
/// Owned by a single receive loop; never shared.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    next: Option<u16>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `spoke` and return how many spokes were skipped before it.
    ///
    /// The first spoke ever seen never counts a gap.
    pub fn observe(&mut self, spoke: u16) -> u64 {
        let spoke = spoke % SPOKES_RAW;
        let missing = match self.next {
            Some(next) if spoke != next => {
                if spoke > next {
                    (spoke - next) as u64
                } else {
                    (SPOKES_RAW + spoke - next) as u64
                }
            }
            _ => 0,
        };
        self.resync(spoke);
        missing
    }

    /// Continue after `spoke` without counting a gap
    pub fn resync(&mut self, spoke: u16) {
        self.next = Some((spoke % SPOKES_RAW + 1) % SPOKES_RAW);
    }

    pub fn next_expected(&self) -> Option<u16> {
        self.next
    }
}
