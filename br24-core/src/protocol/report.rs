//! Status reports.
//!
//! The first byte is the report type, the second the message family. Reports in
//! family `0xC4` are selected by `(datagram length, type)`. The radar sends many
//! reports nobody has decoded yet; those come back as [`Report::Unrecognized`]
//! and are not an error.
//!
//! Types seen on a BR24:
//!
//! ```text
//! 2nd byte C4:   01 02 03 04 05 07 08
//! 2nd byte F5:   08 0C 0D 0F 10 11 12 13 14
//! ```
//!
//! Fields named `_uNN` are not understood and are never interpreted.

use serde::Deserialize;

use super::wide_string;
use crate::error::ParseError;

// =============================================================================
// Constants
// =============================================================================

/// Family of the reports we decode
pub const FAMILY_C4: u8 = 0xC4;

/// Family sent by BR24 radomes; accepted but not decoded
pub const FAMILY_F5: u8 = 0xF5;

pub const REPORT_01_SIZE: usize = 18;
pub const REPORT_02_SIZE: usize = 99;
pub const REPORT_03_SIZE: usize = 129;
pub const REPORT_04_SIZE: usize = 66;
pub const REPORT_08_SIZE: usize = 18;

/// Dispatch keys, `(length, type)`
const REPORT_01_C4_18: (usize, u8) = (REPORT_01_SIZE, 0x01);
const REPORT_02_C4_99: (usize, u8) = (REPORT_02_SIZE, 0x02);
const REPORT_03_C4_129: (usize, u8) = (REPORT_03_SIZE, 0x03);
const REPORT_04_C4_66: (usize, u8) = (REPORT_04_SIZE, 0x04);
const REPORT_08_C4_18: (usize, u8) = (REPORT_08_SIZE, 0x08);

// =============================================================================
// Wire layouts
// =============================================================================

/// Report 01 - Radar status (0x01 0xC4, 18 bytes)
#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Report01 {
    _what: u8,    // 0x01
    _command: u8, // 0xC4
    radar_status: u8,
    _u00: [u8; 15], // 3..18
}

/// Report 02 - Settings (0x02 0xC4, 99 bytes)
#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Report02 {
    _what: u8,                      // 0x02
    _command: u8,                   // 0xC4
    range: [u8; 4],                 // 2..6
    _u00: [u8; 2],                  // 6..8
    gain_auto: [u8; 4],             // 8..12, 1 = auto
    gain: u8,                       // 12
    sea_auto: u8,                   // 13, 0 = off, 1 = harbour, 2 = offshore
    _u01: [u8; 3],                  // 14..17
    sea: [u8; 4],                   // 17..21
    _u02: u8,                       // 21
    rain: u8,                       // 22
    _u03: [u8; 11],                 // 23..34
    interference_rejection: u8,     // 34
    _u04: [u8; 3],                  // 35..38
    target_expansion: u8,           // 38
    _u05: [u8; 3],                  // 39..42
    target_boost: u8,               // 42
    _u06: [u8; 32],                 // 43..75 (split for serde array limit)
    _u07: [u8; 24],                 // 75..99
}

/// Report 03 - Identification (0x03 0xC4, 129 bytes)
#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Report03 {
    _what: u8,                // 0x03
    _command: u8,             // 0xC4
    radar_type: u8,           // 0x01 = 4G, 0x08 = 3G, 0x0F = BR24
    _u00: [u8; 32],           // 3..35
    _u01: [u8; 23],           // 35..58
    firmware_date: [u8; 32],  // 58..90 UTF-16LE
    firmware_time: [u8; 32],  // 90..122 UTF-16LE
    _u02: [u8; 7],            // 122..129
}

/// Report 04 - Installation (0x04 0xC4, 66 bytes)
#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Report04 {
    _what: u8,                  // 0x04
    _command: u8,               // 0xC4
    _u00: [u8; 4],              // 2..6
    bearing_alignment: [u8; 2], // 6..8, tenths of a degree
    _u01: [u8; 2],              // 8..10
    antenna_height: [u8; 2],    // 10..12, millimeters
    _u02: [u8; 32],             // 12..44
    _u03: [u8; 22],             // 44..66
}

/// Report 08 - Scan and noise settings (0x08 0xC4, 18 bytes)
#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Report08 {
    _what: u8,                        // 0x08
    _command: u8,                     // 0xC4
    _u00: u8,                         // 2
    local_interference_rejection: u8, // 3
    scan_speed: u8,                   // 4
    sls_auto: u8,                     // 5, side lobe suppression auto
    _u01: [u8; 3],                    // 6..9
    side_lobe_suppression: u8,        // 9
    _u02: [u8; 2],                    // 10..12
    noise_rejection: u8,              // 12
    target_separation: u8,            // 13
    _u03: [u8; 4],                    // 14..18
}

// =============================================================================
// Decoded types
// =============================================================================

/// Operating status byte from report 01
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadarStatus {
    Standby,
    Transmit,
    WakingUp,
    Unknown(u8),
}

impl RadarStatus {
    pub fn from_byte(status: u8) -> Self {
        match status {
            0x01 => RadarStatus::Standby,
            0x02 => RadarStatus::Transmit,
            0x05 => RadarStatus::WakingUp,
            other => RadarStatus::Unknown(other),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RadarStatus::Standby => "Standby",
            RadarStatus::Transmit => "Transmit",
            RadarStatus::WakingUp => "Waking up",
            RadarStatus::Unknown(_) => "Unknown status",
        }
    }
}

/// Scanner generation as reported in report 03
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum Model {
    #[default]
    Unknown,
    BR24,
    Gen3,
    Gen4,
}

impl Model {
    pub fn from_byte(radar_type: u8) -> Self {
        match radar_type {
            0x0e | 0x0f => Model::BR24, // 0x0e seen on older BR24
            0x08 => Model::Gen3,
            0x01 => Model::Gen4,
            _ => Model::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Unknown => "Unknown",
            Model::BR24 => "BR24",
            Model::Gen3 => "3G",
            Model::Gen4 => "4G",
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub status: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsReport {
    /// Decimeters
    pub range: u32,
    pub gain_auto: u32,
    pub gain: u8,
    pub sea_auto: u8,
    pub sea: u32,
    pub rain: u8,
    pub interference_rejection: u8,
    pub target_expansion: u8,
    pub target_boost: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationReport {
    pub radar_type: u8,
    pub firmware_date: String,
    pub firmware_time: String,
}

impl IdentificationReport {
    pub fn model(&self) -> Model {
        Model::from_byte(self.radar_type)
    }

    /// Human readable build information
    pub fn build_info(&self) -> String {
        format!(
            "Firmware date: {} {}",
            self.firmware_date, self.firmware_time
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallationReport {
    /// Tenths of a degree
    pub bearing_alignment: u16,
    /// Millimeters
    pub antenna_height: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub local_interference_rejection: u8,
    pub scan_speed: u8,
    pub sls_auto: u8,
    pub side_lobe_suppression: u8,
    pub noise_rejection: u8,
    pub target_separation: u8,
}

/// A report, classified by `(length, type)` within its family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Status(StatusReport),
    Settings(SettingsReport),
    Identification(IdentificationReport),
    Installation(InstallationReport),
    Scan(ScanReport),
    /// Family 0xC4, but a `(length, type)` we do not know
    Unrecognized { length: usize, kind: u8 },
    /// Family 0xF5; accepted, not decoded
    Secondary { length: usize, kind: u8 },
}

// =============================================================================
// Parsing
// =============================================================================

/// Classify and decode a report datagram.
///
/// Returns an error only when the datagram is not a radar report at all.
pub fn parse_report(data: &[u8]) -> Result<Report, ParseError> {
    if data.len() < 2 {
        return Err(ParseError::TooShort {
            expected: 2,
            actual: data.len(),
        });
    }

    let length = data.len();
    let kind = data[0];

    match data[1] {
        FAMILY_C4 => {}
        FAMILY_F5 => return Ok(Report::Secondary { length, kind }),
        family => return Err(ParseError::UnknownPacketType(family)),
    }

    let report = match (length, kind) {
        REPORT_01_C4_18 => {
            let r: Report01 = bincode::deserialize(data)?;
            Report::Status(StatusReport {
                status: r.radar_status,
            })
        }
        REPORT_02_C4_99 => {
            let r: Report02 = bincode::deserialize(data)?;
            Report::Settings(SettingsReport {
                range: u32::from_le_bytes(r.range),
                gain_auto: u32::from_le_bytes(r.gain_auto),
                gain: r.gain,
                sea_auto: r.sea_auto,
                sea: u32::from_le_bytes(r.sea),
                rain: r.rain,
                interference_rejection: r.interference_rejection,
                target_expansion: r.target_expansion,
                target_boost: r.target_boost,
            })
        }
        REPORT_03_C4_129 => {
            let r: Report03 = bincode::deserialize(data)?;
            Report::Identification(IdentificationReport {
                radar_type: r.radar_type,
                firmware_date: wide_string(&r.firmware_date),
                firmware_time: wide_string(&r.firmware_time),
            })
        }
        REPORT_04_C4_66 => {
            let r: Report04 = bincode::deserialize(data)?;
            Report::Installation(InstallationReport {
                bearing_alignment: u16::from_le_bytes(r.bearing_alignment),
                antenna_height: u16::from_le_bytes(r.antenna_height),
            })
        }
        REPORT_08_C4_18 => {
            let r: Report08 = bincode::deserialize(data)?;
            Report::Scan(ScanReport {
                local_interference_rejection: r.local_interference_rejection,
                scan_speed: r.scan_speed,
                sls_auto: r.sls_auto,
                side_lobe_suppression: r.side_lobe_suppression,
                noise_rejection: r.noise_rejection,
                target_separation: r.target_separation,
            })
        }
        _ => Report::Unrecognized { length, kind },
    };

    Ok(report)
}

// =============================================================================
// Tests
// =============================================================================
