//! Radar State Tracking
//!
//! The per-radar state model: operating state, control values, statistics,
//! the spoke image and the two watchdog deadlines. It is written by the
//! receive loop and read by whoever displays it; synchronisation is the
//! owner's business, this module is plain data.

use serde::Serialize;

use crate::image::SpokeImage;
use crate::protocol::report::Model;
use crate::sequence::ReceiveStatistics;

/// Base of the auto sentinel range. A control in automatic mode holds a
/// value at or just below this, never a value from a 0..100 scale.
pub const AUTO_RANGE: i32 = -20000;

/// Radar is gone when no report arrived for this long
pub const WATCHDOG_TIMEOUT_MS: u64 = 10_000;

/// Image is stale when no spoke arrived for this long
pub const DATA_TIMEOUT_MS: u64 = 5_000;

/// Operating state of the radar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RadarOperatingState {
    #[default]
    Off,
    Standby,
    WakingUp,
    Transmit,
}

impl std::fmt::Display for RadarOperatingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RadarOperatingState::Off => "Off",
            RadarOperatingState::Standby => "Standby",
            RadarOperatingState::WakingUp => "Waking up",
            RadarOperatingState::Transmit => "Transmit",
        };
        write!(f, "{}", s)
    }
}

/// Operating state plus the time it was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OperatingState {
    pub state: RadarOperatingState,
    pub since_ms: u64,
}

impl OperatingState {
    /// Returns true when the state changed
    pub fn update(&mut self, state: RadarOperatingState, now_ms: u64) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        self.since_ms = now_ms;
        true
    }

    pub fn get(&self) -> RadarOperatingState {
        self.state
    }
}

/// A tunable radar setting as last reported by the radar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ControlValue {
    pub value: i32,
    /// Which UI element last changed this value
    pub button: i32,
    /// Changed since the consumer last acknowledged it
    pub modified: bool,
}

impl ControlValue {
    /// The value used for "automatic" where a control has a single auto mode
    pub const AUTO: i32 = AUTO_RANGE - 1;

    pub fn new(value: i32) -> Self {
        ControlValue {
            value,
            ..Default::default()
        }
    }

    /// Store `value`, flagging a change. Returns true when it changed.
    pub fn update(&mut self, value: i32) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.modified = true;
        true
    }

    pub fn acknowledge(&mut self) {
        self.modified = false;
    }

    pub fn is_auto(&self) -> bool {
        self.value <= AUTO_RANGE
    }
}

/// All control values a report can touch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarControls {
    /// Meters
    pub range: ControlValue,
    pub gain: ControlValue,
    pub sea: ControlValue,
    pub rain: ControlValue,
    pub interference_rejection: ControlValue,
    pub target_boost: ControlValue,
    pub target_expansion: ControlValue,
    pub target_separation: ControlValue,
    pub noise_rejection: ControlValue,
    pub scan_speed: ControlValue,
    /// Degrees, (-180, 180]
    pub bearing_alignment: ControlValue,
    /// Meters
    pub antenna_height: ControlValue,
    pub local_interference_rejection: ControlValue,
    pub side_lobe_suppression: ControlValue,
}

impl RadarControls {
    pub fn any_modified(&self) -> bool {
        self.iter().any(|(_, c)| c.modified)
    }

    pub fn acknowledge_all(&mut self) {
        for c in self.iter_mut() {
            c.acknowledge();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ControlValue)> {
        [
            ("range", &self.range),
            ("gain", &self.gain),
            ("sea", &self.sea),
            ("rain", &self.rain),
            ("interferenceRejection", &self.interference_rejection),
            ("targetBoost", &self.target_boost),
            ("targetExpansion", &self.target_expansion),
            ("targetSeparation", &self.target_separation),
            ("noiseRejection", &self.noise_rejection),
            ("scanSpeed", &self.scan_speed),
            ("bearingAlignment", &self.bearing_alignment),
            ("antennaHeight", &self.antenna_height),
            ("localInterferenceRejection", &self.local_interference_rejection),
            ("sideLobeSuppression", &self.side_lobe_suppression),
        ]
        .into_iter()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut ControlValue> {
        [
            &mut self.range,
            &mut self.gain,
            &mut self.sea,
            &mut self.rain,
            &mut self.interference_rejection,
            &mut self.target_boost,
            &mut self.target_expansion,
            &mut self.target_separation,
            &mut self.noise_rejection,
            &mut self.scan_speed,
            &mut self.bearing_alignment,
            &mut self.antenna_height,
            &mut self.local_interference_rejection,
            &mut self.side_lobe_suppression,
        ]
        .into_iter()
    }
}

/// Complete radar state
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarState {
    pub operating: OperatingState,
    pub controls: RadarControls,
    pub statistics: ReceiveStatistics,
    pub model: Model,
    /// Range of the last spoke, meters
    pub range_meters: i32,
    /// Radar presence deadline, ms since epoch
    pub radar_timeout_ms: u64,
    /// Image data deadline, ms since epoch
    pub data_timeout_ms: u64,
    #[serde(skip)]
    pub image: SpokeImage,
}

impl RadarState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_radar_timeout(&mut self, now_ms: u64) {
        self.radar_timeout_ms = now_ms + WATCHDOG_TIMEOUT_MS;
    }

    pub fn refresh_data_timeout(&mut self, now_ms: u64) {
        self.data_timeout_ms = now_ms + DATA_TIMEOUT_MS;
    }

    /// A report arrived recently enough
    pub fn is_radar_seen(&self, now_ms: u64) -> bool {
        now_ms < self.radar_timeout_ms
    }

    /// Spokes arrived recently enough
    pub fn is_data_seen(&self, now_ms: u64) -> bool {
        now_ms < self.data_timeout_ms
    }

    /// Forget the image, e.g. when spokes stopped coming
    pub fn reset_image(&mut self) {
        self.image.reset();
    }
}
