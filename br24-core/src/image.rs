//! Polar image buffer with per-cell sweep history.

use crate::protocol::{RETURNS_PER_LINE, SPOKES_PER_REVOLUTION};

const SPOKES: usize = SPOKES_PER_REVOLUTION as usize;

/// Cells that had returns in at least two of the last three sweeps
const HAS_BIT_COUNT_2: [bool; 8] = [false, false, false, true, false, true, true, true];

/// Where and when a spoke was received
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpokeMeta {
    /// Bearing on the 2048 circle, including vessel heading
    pub bearing: u16,
    pub range_meters: i32,
    pub time_ms: u64,
    pub position: Option<(f64, f64)>,
}

/// The most recent spoke for every angle, plus a history byte per cell.
///
/// Each history byte holds one bit per sweep, newest in bit 0.
#[derive(Clone)]
pub struct SpokeImage {
    returns: Vec<u8>,
    history: Vec<u8>,
    meta: Vec<Option<SpokeMeta>>,
}

impl Default for SpokeImage {
    fn default() -> Self {
        SpokeImage {
            returns: vec![0; SPOKES * RETURNS_PER_LINE],
            history: vec![0; SPOKES * RETURNS_PER_LINE],
            meta: vec![None; SPOKES],
        }
    }
}

impl std::fmt::Debug for SpokeImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpokeImage")
            .field("spokes", &self.spoke_count())
            .finish()
    }
}

impl SpokeImage {
    /// Store one spoke at `angle` (2048 circle, relative to the bow).
    ///
    /// With `multi_sweep_filter` a cell only keeps its value when it also had
    /// returns in at least one of the two previous sweeps.
    pub fn process_spoke(&mut self, angle: u16, data: &[u8], meta: SpokeMeta, multi_sweep_filter: bool) {
        let angle = angle as usize % SPOKES;
        let start = angle * RETURNS_PER_LINE;
        let len = data.len().min(RETURNS_PER_LINE);

        let history = &mut self.history[start..start + RETURNS_PER_LINE];
        let returns = &mut self.returns[start..start + RETURNS_PER_LINE];

        for i in 0..RETURNS_PER_LINE {
            let value = if i < len { data[i] } else { 0 };
            history[i] = (history[i] << 1) | (value != 0) as u8;
            returns[i] = if multi_sweep_filter && !HAS_BIT_COUNT_2[(history[i] & 7) as usize] {
                0
            } else {
                value
            };
        }

        self.meta[angle] = Some(meta);
    }

    /// Returns of the spoke at `angle`, if one was received since the last reset
    pub fn spoke(&self, angle: u16) -> Option<(&[u8], SpokeMeta)> {
        let angle = angle as usize % SPOKES;
        self.meta[angle].map(|meta| {
            let start = angle * RETURNS_PER_LINE;
            (&self.returns[start..start + RETURNS_PER_LINE], meta)
        })
    }

    pub fn history(&self, angle: u16) -> &[u8] {
        let start = (angle as usize % SPOKES) * RETURNS_PER_LINE;
        &self.history[start..start + RETURNS_PER_LINE]
    }

    /// Number of angles holding a spoke
    pub fn spoke_count(&self) -> usize {
        self.meta.iter().filter(|m| m.is_some()).count()
    }

    pub fn reset(&mut self) {
        self.returns.fill(0);
        self.history.fill(0);
        self.meta.fill(None);
    }
}
