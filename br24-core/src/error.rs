//! Error types for radar packet decoding

use thiserror::Error;

/// Errors that can occur when decoding radar packets
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Packet is too short to contain required data
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// Spoke line header declares a length we cannot interpret
    #[error("Strange header length {header_len} on spoke {sequence}")]
    SpokeHeaderLength { sequence: u16, header_len: u8 },

    /// Failed to deserialize packet structure
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Message family (second byte) not recognized
    #[error("Unknown message family: {0:#04X}")]
    UnknownPacketType(u8),
}

impl From<bincode::Error> for ParseError {
    fn from(e: bincode::Error) -> Self {
        ParseError::DeserializationFailed(e.to_string())
    }
}
