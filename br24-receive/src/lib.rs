//! # BR24 Receive
//!
//! Receive subsystem for Navico BR24, 3G and 4G radars.
//!
//! This crate finds a radar on the local network and keeps a
//! [`br24_core::RadarState`] up to date from its multicast traffic:
//! - Scans the local interfaces for the radar's report multicast group
//! - Opens the image data group once the radar answered
//! - Decodes spokes into the spoke image and reports into control values
//! - Notices when the radar or its image data goes quiet
//!
//! ## Architecture
//!
//! Decoding and state live in [`br24_core`]. This crate adds sockets and a
//! dedicated thread per radar.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     br24-receive                         │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  NavicoReceive (one OS thread per radar)           │  │
//! │  │  - interface cursor, report + data sockets         │  │
//! │  │  - 250 ms wait, watchdog counters                  │  │
//! │  └───────────────┬───────────────────────┬────────────┘  │
//! │                  ▼                       ▼               │
//! │  ┌──────────────────────────┐  ┌──────────────────────┐  │
//! │  │ SharedRadarState (Mutex) │  │ StatusText (Mutex)   │  │
//! │  └──────────────────────────┘  └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`navico::NavicoReceive`] - Start, stop and observe a receive thread
//! - [`radar::RadarHost`] - What the receive thread needs from the rest of the system
//! - [`radar::SharedRadarState`] - The radar state, readable from any thread
//! - [`network`] - Multicast sockets and interface enumeration
//!
//! ## Example: Receiving from Radar A
//!
//! ```rust,no_run
//! use br24_receive::navico::NavicoReceive;
//! use br24_receive::radar::{RadarHost, RadarId, ReceiveSettings};
//! use std::net::{Ipv4Addr, SocketAddrV4};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Host;
//!
//! impl RadarHost for Host {
//!     fn radar_position(&self) -> Option<(f64, f64)> { None }
//!     fn heading_true(&self) -> f64 { 0.0 }
//!     fn set_radar_heading(&self, _heading: Option<(f64, bool)>) {}
//!     fn detected_radar(&self, interface: Ipv4Addr, radar: SocketAddrV4) {
//!         println!("radar {} via {}", radar, interface);
//!     }
//!     fn set_build_info(&self, _info: &str) {}
//! }
//!
//! let mut receiver =
//!     NavicoReceive::start(RadarId::A, ReceiveSettings::default(), Arc::new(Host)).unwrap();
//! std::thread::sleep(Duration::from_secs(10));
//! println!("{}", receiver.status());
//! receiver.shutdown();
//! receiver.wait_exited(Duration::from_secs(1)).unwrap();
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-r, --radar` - Radar A or B of a 4G (default: a)
//! - `-i, --interface` - Limit the radar search to one network interface
//! - `-v` - Increase verbosity (use multiple times)

use clap::Parser;
use std::path::PathBuf;

pub mod navico;
pub mod network;
pub mod radar;

use radar::{RadarId, ReceiveSettings};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Limit radar location to a single interface
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Which radar to listen for
    #[arg(short, long, value_enum, default_value_t)]
    pub radar: RadarId,

    /// Do not use the heading that the radar sends
    #[arg(long, default_value_t = false)]
    pub ignore_radar_heading: bool,

    /// Only show returns seen in two of the last three sweeps
    #[arg(long, default_value_t = false)]
    pub multi_sweep: bool,

    /// Read receive settings from this JSON file; flags above take precedence
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Seconds between status lines
    #[arg(long, default_value_t = 10)]
    pub status_interval: u64,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,
}

impl Cli {
    /// Overlay the command line flags on `base`
    pub fn receive_settings(&self, base: ReceiveSettings) -> ReceiveSettings {
        ReceiveSettings {
            ignore_radar_heading: base.ignore_radar_heading || self.ignore_radar_heading,
            multi_sweep_filter: base.multi_sweep_filter || self.multi_sweep,
            interface: self.interface.clone().or(base.interface),
        }
    }
}
