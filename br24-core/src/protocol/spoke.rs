//! Spoke data frames.
//!
//! A frame is an 8 byte header followed by up to [`MAX_SPOKES_PER_FRAME`] lines.
//! Each line is a 24 byte header and [`RETURNS_PER_LINE`] bytes of returns.
//! Two header layouts exist; the 4 bytes at line offset 4 tell them apart.

use serde::Deserialize;

use super::{
    raw_to_degrees, raw_to_spoke, MAX_SPOKES_PER_FRAME, RETURNS_PER_LINE, SPOKES_PER_FRAME,
    SPOKES_RAW,
};
use crate::error::ParseError;

// =============================================================================
// Constants
// =============================================================================

pub const FRAME_HEADER_SIZE: usize = 8;

/// Declared header length of a valid line (0x18)
pub const LINE_HEADER_SIZE: usize = 24;

pub const LINE_SIZE: usize = LINE_HEADER_SIZE + RETURNS_PER_LINE;

/// Largest frame we will ever decode; use as receive buffer size
pub const MAX_FRAME_SIZE: usize = FRAME_HEADER_SIZE + MAX_SPOKES_PER_FRAME * LINE_SIZE;

/// Marker at line offset 4 that identifies BR24 and 3G scanners
pub const BR24_MARK: [u8; 4] = [0x00, 0x44, 0x0d, 0x0e];

/// Line status values seen on healthy spokes
const STATUS_NORMAL: u8 = 0x02;
const STATUS_NORMAL_ALT: u8 = 0x12;

/// 4G large range value that says "look at small range instead"
const LARGE_RANGE_USE_SMALL: i16 = 0x80;

/*
 Heading on radar. Observed in field:
 - BR24, no RI: 0x9234 = negative, with recognisable 1234 in hex?
 - 3G, RI, true heading: 0x45be
 - 4G, RI, mag heading: 0x07d6 = 2006 = 176,6 deg
 - 4G, RI, no heading: 0x8000 = -1 = negative
*/
pub const HEADING_TRUE_FLAG: u16 = 0x4000;
pub const HEADING_MASK: u16 = SPOKES_RAW - 1;

// =============================================================================
// Wire layouts
// =============================================================================

/// BR24/3G line header (24 bytes)
#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Br24LineHeader {
    _header_len: u8,
    status: u8,
    _scan_number: [u8; 2],
    _mark: [u8; 4], // always BR24_MARK
    angle: [u8; 2],
    heading: [u8; 2],
    range: [u8; 4], // 24 bits used
    _u01: [u8; 2],
    _u02: [u8; 2],
    _u03: [u8; 4],
}

/// 4G line header (24 bytes)
#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct Br4gLineHeader {
    _header_len: u8,
    status: u8,
    _scan_number: [u8; 2],
    _u00: [u8; 2], // 0x4400
    large_range: [u8; 2],
    angle: [u8; 2],
    heading: [u8; 2],
    small_range: [u8; 2], // or -1
    rotation: [u8; 2],
    _u02: [u8; 4], // always -1
    _u03: [u8; 4],
}

// =============================================================================
// Decoded types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderVariant {
    /// BR24 and 3G scanners
    Br24,
    /// 4G scanners
    Br4g,
}

/// Heading as sent by the radar when it has an RI-10/11 interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeading(pub u16);

impl RawHeading {
    pub fn is_valid(&self) -> bool {
        self.0 & !(HEADING_TRUE_FLAG | HEADING_MASK) == 0
    }

    pub fn is_true(&self) -> bool {
        self.0 & HEADING_TRUE_FLAG != 0
    }

    /// Heading in degrees [0, 360), or None when the radar has none
    pub fn degrees(&self) -> Option<f64> {
        if self.is_valid() {
            Some(raw_to_degrees(self.0 & HEADING_MASK))
        } else {
            None
        }
    }
}

/// One decoded spoke
#[derive(Debug, Clone, PartialEq)]
pub struct RadarLine<'a> {
    /// Sequence number, 0..4095
    pub sequence: u16,
    pub status: u8,
    pub variant: HeaderVariant,
    /// Angle relative to the bow on the 4096 circle
    pub angle_raw: u16,
    pub heading: RawHeading,
    pub range_raw: i32,
    pub range_meters: i32,
    pub returns: &'a [u8],
    /// 4G only
    pub rotation: Option<u16>,
}

impl RadarLine<'_> {
    /// Status is advisory; unexpected values still carry usable data
    pub fn has_normal_status(&self) -> bool {
        self.status == STATUS_NORMAL || self.status == STATUS_NORMAL_ALT
    }

    /// Angle on the 2048 spoke circle
    pub fn angle(&self) -> u16 {
        raw_to_spoke(self.angle_raw as i32)
    }

    /// Bearing on the 2048 spoke circle, given the vessel heading in raw 4096 units.
    /// Both are added before halving so rounding matches [`RadarLine::angle`].
    pub fn bearing(&self, heading_raw: i32) -> u16 {
        raw_to_spoke(self.angle_raw as i32 + heading_raw)
    }
}

/// A frame that passed the header check; lines are decoded lazily
#[derive(Debug, Clone, Copy)]
pub struct RadarFrame<'a> {
    data: &'a [u8],
    scanlines: usize,
}

impl<'a> RadarFrame<'a> {
    /// Number of whole lines in the frame
    pub fn scanlines(&self) -> usize {
        self.scanlines
    }

    /// Healthy frames carry exactly 32 lines
    pub fn is_nominal(&self) -> bool {
        self.scanlines == SPOKES_PER_FRAME
    }

    pub fn lines(&self) -> impl Iterator<Item = Result<RadarLine<'a>, ParseError>> + 'a {
        let data = self.data;
        (0..self.scanlines).map(move |i| {
            let offset = FRAME_HEADER_SIZE + i * LINE_SIZE;
            parse_line(&data[offset..offset + LINE_SIZE])
        })
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Check the frame header and work out how many lines follow it
pub fn parse_frame(data: &[u8]) -> Result<RadarFrame<'_>, ParseError> {
    if data.len() < FRAME_HEADER_SIZE {
        return Err(ParseError::TooShort {
            expected: FRAME_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let scanlines = ((data.len() - FRAME_HEADER_SIZE) / LINE_SIZE).min(MAX_SPOKES_PER_FRAME);

    Ok(RadarFrame { data, scanlines })
}

/// Decode one line (header plus returns)
pub fn parse_line(data: &[u8]) -> Result<RadarLine<'_>, ParseError> {
    if data.len() < LINE_SIZE {
        return Err(ParseError::TooShort {
            expected: LINE_SIZE,
            actual: data.len(),
        });
    }

    let header_len = data[0];
    let sequence = u16::from_le_bytes([data[2], data[3]]) % SPOKES_RAW;
    if header_len as usize != LINE_HEADER_SIZE {
        return Err(ParseError::SpokeHeaderLength {
            sequence,
            header_len,
        });
    }

    let header = &data[..LINE_HEADER_SIZE];
    let returns = &data[LINE_HEADER_SIZE..LINE_SIZE];

    if data[4..8] == BR24_MARK {
        parse_br24_header(header, sequence, returns)
    } else {
        parse_4g_header(header, sequence, returns)
    }
}

fn parse_br24_header<'a>(
    header: &[u8],
    sequence: u16,
    returns: &'a [u8],
) -> Result<RadarLine<'a>, ParseError> {
    let h: Br24LineHeader = bincode::deserialize(header)?;

    let range_raw = (u32::from_le_bytes(h.range) & 0x00ff_ffff) as i32;
    let range_meters = (range_raw as f64 * 10.0 / std::f64::consts::SQRT_2) as i32;

    Ok(RadarLine {
        sequence,
        status: h.status,
        variant: HeaderVariant::Br24,
        angle_raw: u16::from_le_bytes(h.angle),
        heading: RawHeading(u16::from_le_bytes(h.heading)),
        range_raw,
        range_meters,
        returns,
        rotation: None,
    })
}

fn parse_4g_header<'a>(
    header: &[u8],
    sequence: u16,
    returns: &'a [u8],
) -> Result<RadarLine<'a>, ParseError> {
    let h: Br4gLineHeader = bincode::deserialize(header)?;

    let large_range = i16::from_le_bytes(h.large_range);
    let small_range = i16::from_le_bytes(h.small_range);
    let range_raw = range_4g(large_range, small_range);

    Ok(RadarLine {
        sequence,
        status: h.status,
        variant: HeaderVariant::Br4g,
        angle_raw: u16::from_le_bytes(h.angle),
        heading: RawHeading(u16::from_le_bytes(h.heading)),
        range_raw,
        range_meters: range_raw / 4,
        returns,
        rotation: Some(u16::from_le_bytes(h.rotation)),
    })
}

/// 4G raw range. The large/small choice is reverse engineered; keep it as observed.
pub fn range_4g(large_range: i16, small_range: i16) -> i32 {
    if large_range == LARGE_RANGE_USE_SMALL {
        if small_range == -1 {
            0 // invalid range received
        } else {
            small_range as i32
        }
    } else {
        large_range as i32 * 256
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn br24_line(sequence: u16, angle: u16, heading: u16, range: u32) -> Vec<u8> {
        let mut line = vec![0x18, 0x02];
        line.extend_from_slice(&sequence.to_le_bytes());
        line.extend_from_slice(&BR24_MARK);
        line.extend_from_slice(&angle.to_le_bytes());
        line.extend_from_slice(&heading.to_le_bytes());
        line.extend_from_slice(&range.to_le_bytes());
        line.extend_from_slice(&[0u8; 8]);
        line.extend(std::iter::repeat(0x11).take(RETURNS_PER_LINE));
        line
    }

    fn br4g_line(sequence: u16, large: i16, angle: u16, heading: u16, small: i16) -> Vec<u8> {
        let mut line = vec![0x18, 0x12];
        line.extend_from_slice(&sequence.to_le_bytes());
        line.extend_from_slice(&[0x00, 0x44]);
        line.extend_from_slice(&large.to_le_bytes());
        line.extend_from_slice(&angle.to_le_bytes());
        line.extend_from_slice(&heading.to_le_bytes());
        line.extend_from_slice(&small.to_le_bytes());
        line.extend_from_slice(&0x0123u16.to_le_bytes());
        line.extend_from_slice(&[0xff; 8]);
        line.extend(std::iter::repeat(0x22).take(RETURNS_PER_LINE));
        line
    }

    fn frame(lines: &[Vec<u8>]) -> Vec<u8> {
        let mut data = vec![0u8; FRAME_HEADER_SIZE];
        for line in lines {
            data.extend_from_slice(line);
        }
        data
    }

    #[test]
    fn test_sizes() {
        assert_eq!(std::mem::size_of::<Br24LineHeader>(), LINE_HEADER_SIZE);
        assert_eq!(std::mem::size_of::<Br4gLineHeader>(), LINE_HEADER_SIZE);
        assert_eq!(LINE_SIZE, 536);
    }

    #[test]
    fn test_br24_range() {
        let data = br24_line(7, 100, 0x8000, 1000);
        let line = parse_line(&data).unwrap();
        assert_eq!(line.variant, HeaderVariant::Br24);
        assert_eq!(line.range_raw, 1000);
        assert_eq!(line.range_meters, 7071);
        assert_eq!(line.sequence, 7);
        assert_eq!(line.returns.len(), RETURNS_PER_LINE);
        assert_eq!(line.rotation, None);
    }

    #[test]
    fn test_br24_range_uses_24_bits() {
        let data = br24_line(0, 0, 0, 0xff00_0001);
        let line = parse_line(&data).unwrap();
        assert_eq!(line.range_raw, 1);
    }

    #[test]
    fn test_4g_range() {
        let line_data = br4g_line(1, 0x80, 0, 0, 400);
        let line = parse_line(&line_data).unwrap();
        assert_eq!(line.variant, HeaderVariant::Br4g);
        assert_eq!(line.range_raw, 400);
        assert_eq!(line.range_meters, 100);
        assert_eq!(line.rotation, Some(0x0123));

        let line_data = br4g_line(1, 0x80, 0, 0, -1);
        let line = parse_line(&line_data).unwrap();
        assert_eq!(line.range_raw, 0);
        assert_eq!(line.range_meters, 0);

        let line_data = br4g_line(1, 10, 0, 0, 400);
        let line = parse_line(&line_data).unwrap();
        assert_eq!(line.range_raw, 2560);
        assert_eq!(line.range_meters, 640);
    }

    #[test]
    fn test_heading_validity() {
        assert!(!RawHeading(0x8000).is_valid());
        assert!(!RawHeading(0x9234).is_valid());
        assert_eq!(RawHeading(0x8000).degrees(), None);

        let magnetic = RawHeading(0x07d6);
        assert!(magnetic.is_valid());
        assert!(!magnetic.is_true());

        let true_heading = RawHeading(0x4000 | 0x07d6);
        assert!(true_heading.is_valid());
        assert!(true_heading.is_true());
        assert_eq!(true_heading.degrees(), magnetic.degrees());
    }

    #[test]
    fn test_angle_halving() {
        let data = br24_line(0, 4095, 0, 0);
        let line = parse_line(&data).unwrap();
        assert_eq!(line.angle(), 2047);

        let data = br24_line(0, 4096, 0, 0);
        let line = parse_line(&data).unwrap();
        assert_eq!(line.angle(), 0);
    }

    #[test]
    fn test_bearing_adds_before_halving() {
        let data = br24_line(0, 1, 0, 0);
        let line = parse_line(&data).unwrap();
        // (1 + 1) / 2 = 1, whereas 1/2 + 1/2 would give 0
        assert_eq!(line.bearing(1), 1);
        assert_eq!(line.bearing(4095), 0);
        assert_eq!(line.bearing(-2), 0);
    }

    #[test]
    fn test_bad_header_length() {
        let mut data = br24_line(4095, 0, 0, 0);
        data[0] = 0x14;
        match parse_line(&data) {
            Err(ParseError::SpokeHeaderLength {
                sequence,
                header_len,
            }) => {
                assert_eq!(sequence, 4095);
                assert_eq!(header_len, 0x14);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_strange_status_is_still_decoded() {
        let mut data = br4g_line(3, 0x80, 8, 0, 400);
        data[1] = 0x07;
        let line = parse_line(&data).unwrap();
        assert!(!line.has_normal_status());
        assert_eq!(line.angle(), 4);
    }

    #[test]
    fn test_frame_too_short() {
        assert_eq!(
            parse_frame(&[0u8; 5]).unwrap_err(),
            ParseError::TooShort {
                expected: FRAME_HEADER_SIZE,
                actual: 5
            }
        );
        let frame = parse_frame(&[0u8; FRAME_HEADER_SIZE]).unwrap();
        assert_eq!(frame.scanlines(), 0);
        assert_eq!(frame.lines().count(), 0);
    }

    #[test]
    fn test_frame_partial_line_is_ignored() {
        let mut data = frame(&[br24_line(1, 2, 0, 3), br24_line(2, 4, 0, 3)]);
        data.extend_from_slice(&[0x18; 100]);
        let frame = parse_frame(&data).unwrap();
        assert_eq!(frame.scanlines(), 2);
        assert!(!frame.is_nominal());
        let sequences: Vec<u16> = frame.lines().map(|l| l.unwrap().sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_frame_nominal_and_mixed_layouts() {
        let lines: Vec<Vec<u8>> = (0..32)
            .map(|i| {
                if i % 2 == 0 {
                    br24_line(i, i * 2, 0, 1000)
                } else {
                    br4g_line(i, 10, i * 2, 0, 0)
                }
            })
            .collect();
        let data = frame(&lines);
        let frame = parse_frame(&data).unwrap();
        assert!(frame.is_nominal());
        for (i, line) in frame.lines().enumerate() {
            let line = line.unwrap();
            assert_eq!(line.sequence as usize, i);
            if i % 2 == 0 {
                assert_eq!(line.variant, HeaderVariant::Br24);
            } else {
                assert_eq!(line.variant, HeaderVariant::Br4g);
            }
        }
    }

    #[test]
    fn test_decoding_is_pure() {
        let data = frame(&[br4g_line(9, 0x80, 4000, 0x47d6, 800), br24_line(10, 4002, 0, 12)]);
        let first: Vec<_> = parse_frame(&data).unwrap().lines().collect();
        let second: Vec<_> = parse_frame(&data).unwrap().lines().collect();
        assert_eq!(first, second);
    }
}
