//! Mesh transport layer abstraction.
//!
//! Defines the `MeshTransport` trait for talking to a mesh gateway device,
//! allowing different implementations (serial, mock, etc.).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::constants::{MESH_ACCESS_ADDR, MESH_CHANNEL, MESH_INTERVAL_MIN_MS};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open {port}: {message}")]
    OpenFailed { port: String, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Command 0x{opcode:02X} failed with status 0x{status:02X}")]
    CommandFailed { opcode: u8, status: u8 },

    #[error("Payload of {len} bytes exceeds the {max}-byte serial limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Radio parameters for joining the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub access_address: u32,
    pub interval_min_ms: u32,
    pub channel: u8,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            access_address: MESH_ACCESS_ADDR,
            interval_min_ms: MESH_INTERVAL_MIN_MS,
            channel: MESH_CHANNEL,
        }
    }
}

/// Asynchronous event delivered by the mesh device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    /// Device (re)booted.
    DeviceStarted(Vec<u8>),
    /// DFU traffic. The payload still carries its 2-byte link tag.
    Dfu(Vec<u8>),
    /// A new handle value appeared in the mesh.
    New { handle: u16, data: Vec<u8> },
    /// A handle value was updated.
    Update { handle: u16, data: Vec<u8> },
    /// Conflicting versions of a handle value were seen.
    Conflicting { handle: u16, data: Vec<u8> },
    /// A value we sent went out on air.
    Tx { handle: u16, data: Vec<u8> },
    /// Anything we do not decode.
    Unknown { opcode: u8, payload: Vec<u8> },
}

impl fmt::Display for MeshEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshEvent::DeviceStarted(data) => write!(f, "device started ({} bytes)", data.len()),
            MeshEvent::Dfu(data) => write!(f, "DFU ({} bytes)", data.len()),
            MeshEvent::New { handle, data } => {
                write!(f, "new handle 0x{:04X} ({} bytes)", handle, data.len())
            }
            MeshEvent::Update { handle, data } => {
                write!(f, "update handle 0x{:04X} ({} bytes)", handle, data.len())
            }
            MeshEvent::Conflicting { handle, data } => {
                write!(f, "conflicting handle 0x{:04X} ({} bytes)", handle, data.len())
            }
            MeshEvent::Tx { handle, data } => {
                write!(f, "tx handle 0x{:04X} ({} bytes)", handle, data.len())
            }
            MeshEvent::Unknown { opcode, payload } => {
                write!(f, "unknown opcode 0x{:02X} ({} bytes)", opcode, payload.len())
            }
        }
    }
}

/// Abstract mesh transport interface.
///
/// This trait enables:
/// - Production implementation over a serial port
/// - Mock implementation for unit testing
pub trait MeshTransport: Send + Sync {
    /// Join the mesh with the given radio parameters.
    fn initialize(&self, config: &MeshConfig) -> Result<(), TransportError>;

    /// Reset the radio. The device reboots and reports DEVICE_STARTED.
    fn radio_reset(&self) -> Result<(), TransportError>;

    /// Send an encoded DFU message and return the device's response bytes.
    fn send_dfu(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Block until the next asynchronous event arrives.
    fn next_event(&self) -> Result<MeshEvent, TransportError>;

    /// Check if the device is still connected.
    fn is_connected(&self) -> bool;
}
