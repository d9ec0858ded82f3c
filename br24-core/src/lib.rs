//! # BR24 Core
//!
//! Platform-independent receive logic for Navico BR24, 3G and 4G radars.
//!
//! This crate contains pure parsing and state logic with **zero I/O dependencies**.
//! Sockets, threads and timing live in `br24-receive`; everything here takes
//! bytes and a timestamp and returns values.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  br24-core (platform-independent, no tokio/async deps)       │
//! │  ├── protocol/   (spoke frame and report decoding)           │
//! │  ├── sequence    (spoke gap tracking, receive statistics)    │
//! │  ├── dispatch    (reports -> control values)                 │
//! │  ├── state       (RadarState, ControlValue, deadlines)       │
//! │  └── image       (spoke image with sweep history)            │
//! └──────────────────────────────────────────────────────────────┘
//!                              ▲
//!                 ┌────────────┴────────────┐
//!                 │  br24-receive           │
//!                 │  (receive thread)       │
//!                 └─────────────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`protocol`] - Wire format of data frames and reports
//! - [`sequence`] - [`SequenceTracker`] and [`ReceiveStatistics`]
//! - [`dispatch`] - [`ReportDispatcher`], applies reports to a [`RadarState`]
//! - [`state`] - The per-radar state model
//!
//! ## Example: Applying a Report
//!
//! ```rust
//! use br24_core::protocol::report::parse_report;
//! use br24_core::{RadarOperatingState, RadarState, ReportDispatcher};
//!
//! let mut packet = vec![0x01, 0xC4, 0x02];
//! packet.resize(18, 0);
//!
//! let mut state = RadarState::new();
//! let mut dispatcher = ReportDispatcher::new();
//! let report = parse_report(&packet).unwrap();
//! dispatcher.dispatch(&report, &mut state, 0);
//! assert_eq!(state.operating.get(), RadarOperatingState::Transmit);
//! ```

pub mod dispatch;
pub mod error;
pub mod image;
pub mod protocol;
pub mod sequence;
pub mod state;

// Re-export commonly used types
pub use dispatch::{DispatchEvent, ReportDispatcher};
pub use error::ParseError;
pub use image::{SpokeImage, SpokeMeta};
pub use protocol::report::{Model, RadarStatus, Report};
pub use sequence::{ReceiveStatistics, SequenceTracker};
pub use state::{ControlValue, RadarControls, RadarOperatingState, RadarState};
