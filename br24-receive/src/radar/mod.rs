use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use strum::{Display, EnumIter};
use thiserror::Error;

use br24_core::protocol::{
    COMMAND_ADDR_A, COMMAND_ADDR_B, DATA_ADDR_A, DATA_ADDR_B, REPORT_ADDR_A, REPORT_ADDR_B,
};
use br24_core::RadarState;

#[derive(Error, Debug)]
pub enum RadarError {
    #[error("I/O operation failed")]
    Io(#[from] std::io::Error),
    #[error("Cannot detect Ethernet devices")]
    EnumerationFailed,
    #[error("No interface with a usable IPv4 address")]
    NoInterface,
    #[error("Cannot start receive thread: {0}")]
    ThreadSpawn(std::io::Error),
    #[error("Receive thread did not stop")]
    Shutdown,
}

/// Which of the two radars of a 4G (or the only radar of a BR24/3G)
#[derive(
    clap::ValueEnum,
    Display,
    EnumIter,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RadarId {
    #[default]
    #[strum(to_string = "Radar A")]
    A,
    #[strum(to_string = "Radar B")]
    B,
}

impl RadarId {
    pub fn report_addr(&self) -> SocketAddrV4 {
        match self {
            RadarId::A => REPORT_ADDR_A,
            RadarId::B => REPORT_ADDR_B,
        }
    }

    pub fn data_addr(&self) -> SocketAddrV4 {
        match self {
            RadarId::A => DATA_ADDR_A,
            RadarId::B => DATA_ADDR_B,
        }
    }

    /// Not used for receiving; kept with the other two so the set is complete
    pub fn command_addr(&self) -> SocketAddrV4 {
        match self {
            RadarId::A => COMMAND_ADDR_A,
            RadarId::B => COMMAND_ADDR_B,
        }
    }
}

/// Receive options that can be changed per radar
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReceiveSettings {
    /// Do not publish the heading that the radar sends along with its spokes
    pub ignore_radar_heading: bool,
    /// Only show returns seen in at least two of the last three sweeps
    pub multi_sweep_filter: bool,
    /// Only look for the radar on the interface with this name
    pub interface: Option<String>,
}

/// The rest of the system, as seen from the receive thread.
///
/// All calls are made from the receive thread, never while the radar state
/// is locked.
pub trait RadarHost: Send + Sync {
    /// Own position as (latitude, longitude), if known
    fn radar_position(&self) -> Option<(f64, f64)>;

    /// True heading of the vessel in degrees
    fn heading_true(&self) -> f64;

    /// Heading reported by the radar itself (degrees, is-true), or None
    fn set_radar_heading(&self, heading: Option<(f64, bool)>);

    /// A radar answered on `interface`
    fn detected_radar(&self, interface: Ipv4Addr, radar: SocketAddrV4);

    fn set_build_info(&self, info: &str);

    /// Mirror of the status text
    fn set_status(&self, _status: &str) {}
}

/// Radar state shared between the receive thread and its readers
#[derive(Clone, Debug, Default)]
pub struct SharedRadarState {
    inner: Arc<Mutex<RadarState>>,
}

impl SharedRadarState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the state. A panic in another holder does not make the data unusable.
    pub fn lock(&self) -> MutexGuard<'_, RadarState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the state for display
    pub fn snapshot(&self) -> RadarState {
        self.lock().clone()
    }
}

/// Human readable receive status, locked separately from the radar state
#[derive(Clone, Debug, Default)]
pub struct StatusText {
    inner: Arc<Mutex<String>>,
}

impl StatusText {
    pub fn set(&self, status: String) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn get(&self) -> String {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Milliseconds since the epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
