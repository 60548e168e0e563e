//! Acknowledgement parsing.
//!
//! Every DFU send is answered with the two-byte little-endian handle of the
//! message the device accepted.

use std::fmt;

use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AckError {
    #[error("Not an ack: expected 2 bytes, got {len}")]
    Malformed { len: usize },
}

/// Parsed acknowledgement from the device.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    handle: u16,
}

impl Ack {
    /// Parse a command response.
    pub fn from_response(bytes: &[u8]) -> Result<Self, AckError> {
        match bytes {
            [lo, hi] => Ok(Self {
                handle: u16::from_le_bytes([*lo, *hi]),
            }),
            _ => Err(AckError::Malformed { len: bytes.len() }),
        }
    }

    pub const fn from_handle(handle: u16) -> Self {
        Self { handle }
    }

    /// Raw handle value.
    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// Wire bytes, as the device sends them.
    pub fn to_bytes(&self) -> [u8; 2] {
        self.handle.to_le_bytes()
    }

    /// Human-readable name of the acknowledged message family.
    pub fn label(&self) -> &'static str {
        match self.handle {
            HANDLE_FWID => "FWID",
            HANDLE_READY => "READY",
            HANDLE_START_DATA => "START/DATA",
            HANDLE_DATA_REQ => "DATA_REQ",
            HANDLE_DATA_RSP => "DATA_RSP",
            HANDLE_RELAY_REQUEST => "RELAY_REQUEST",
            _ => "UNKNOWN",
        }
    }

    pub fn is_known(&self) -> bool {
        self.label() != "UNKNOWN"
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ack(0x{:04X} {})", self.handle, self.label())
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X} ({})", self.handle, self.label())
    }
}
