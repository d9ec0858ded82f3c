//! Navico BR24 / 3G / 4G wire protocol.
//!
//! All functions are pure (`&[u8]` → `Result<T>`), no I/O. Multi-byte fields are
//! little-endian and every structure is byte-packed.
//!
//! # Structure
//!
//! - [`spoke`] - Image data frames, received on the data multicast group
//! - [`report`] - Status reports, received on the report multicast group
//!
//! # Example
//!
//! ```rust
//! use br24_core::protocol::report::{parse_report, Report};
//!
//! let mut packet = vec![0x01, 0xC4, 0x02];
//! packet.resize(18, 0);
//! match parse_report(&packet) {
//!     Ok(Report::Status(status)) => println!("radar status byte {}", status.status),
//!     Ok(other) => println!("report {:?}", other),
//!     Err(e) => println!("not a radar report: {}", e),
//! }
//! ```

use std::net::{Ipv4Addr, SocketAddrV4};

pub mod report;
pub mod spoke;

// =============================================================================
// Constants
// =============================================================================

/// Raw spoke count; the radar numbers its spokes on a 4096 circle
pub const SPOKES_RAW: u16 = 4096;

/// Spokes per revolution exposed to the rest of the system (raw / 2)
pub const SPOKES_PER_REVOLUTION: u16 = SPOKES_RAW / 2;

/// Bytes of return data per spoke line (two 4-bit pixels per byte)
pub const RETURNS_PER_LINE: usize = 512;

/// Lines per frame in a healthy data packet
pub const SPOKES_PER_FRAME: usize = 32;

/// Upper bound of lines we accept in a single frame (keeps a frame below 64 kB)
pub const MAX_SPOKES_PER_FRAME: usize = 120;

/// Radar A (BR24, 3G, 4G primary) multicast groups
pub const REPORT_ADDR_A: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 9), 6679);
pub const DATA_ADDR_A: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 8), 6678);
pub const COMMAND_ADDR_A: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 10), 6680);

/// Radar B (second range of a 4G) multicast groups
pub const REPORT_ADDR_B: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 15), 6659);
pub const DATA_ADDR_B: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 13), 6657);
pub const COMMAND_ADDR_B: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 14), 6658);

/// Map a raw 4096-circle value onto the 2048 spokes used everywhere else
pub fn raw_to_spoke(raw: i32) -> u16 {
    (raw / 2).rem_euclid(SPOKES_PER_REVOLUTION as i32) as u16
}

/// Degrees to raw 4096-circle units (truncating, like the radar does)
pub fn degrees_to_raw(degrees: f64) -> i32 {
    (degrees * SPOKES_RAW as f64 / 360.0) as i32
}

/// Raw 4096-circle units to degrees in [0, 360)
pub fn raw_to_degrees(raw: u16) -> f64 {
    (raw as f64 * 360.0 / SPOKES_RAW as f64).rem_euclid(360.0)
}

/// Decode a zero-terminated UTF-16LE string, stopping at the first zero code unit
pub fn wide_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .take_while(|&c| c != 0)
        .collect();

    String::from_utf16_lossy(&units)
}
