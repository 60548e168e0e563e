//! Protocol constants for mesh DFU messages and the mesh serial interface.

// ============================================================================
// Message Handles
// ============================================================================

/// Firmware identity announcement / reply.
pub const HANDLE_FWID: u16 = 0xFFFE;
/// READY family (app, softdevice, bootloader).
pub const HANDLE_READY: u16 = 0xFFFD;
/// START_DFU and DFU_DATA share this handle.
pub const HANDLE_START_DATA: u16 = 0xFFFC;
/// Data request.
pub const HANDLE_DATA_REQ: u16 = 0xFFFB;
/// Data response.
pub const HANDLE_DATA_RSP: u16 = 0xFFFA;
/// Relay request.
pub const HANDLE_RELAY_REQUEST: u16 = 0xFFF9;

// ============================================================================
// Transfer
// ============================================================================

/// Bytes of firmware carried by one DFU_DATA message.
pub const SEGMENT_SIZE: usize = 16;

/// Bytes per word in the START_DFU `length` field.
pub const WORD_SIZE: usize = 4;

/// Link-layer tag prefixed to every inbound DFU event payload.
pub const LINK_TAG_LEN: usize = 2;

/// READY_APP `transactionId` the device uses to acknowledge our READY request.
pub const READY_ACK_TRANSACTION_ID: u64 = 7;

/// Upper bound (exclusive) for generated transaction ids.
pub const TRANSACTION_ID_LIMIT: u32 = 1 << 30;

/// Safe-state redispatches allowed within one transition.
pub const MAX_REDISPATCH: usize = 4;

// ============================================================================
// Local Identity Defaults
// ============================================================================

pub const DEFAULT_SD_VERSION: u16 = 0x64;
pub const DEFAULT_BL_TYPE: u8 = 0x01;
pub const DEFAULT_BL_VERSION: u8 = 0x01;
pub const DEFAULT_COMPANY_ID: u32 = 0x59;
pub const DEFAULT_APP_ID: u16 = 0xBEEF;
pub const DEFAULT_APP_VERSION: u32 = 0x02;

/// READY_APP `type`.
pub const DEFAULT_DFU_TYPE: u8 = 0;
/// Authority we claim in READY_APP.
pub const DEFAULT_AUTHORITY: u8 = 7;
pub const DEFAULT_START_ADDRESS: u32 = 0x18000;
pub const DEFAULT_START_FLAGS: u8 = 0;

// ============================================================================
// Mesh Radio Defaults
// ============================================================================

pub const MESH_ACCESS_ADDR: u32 = 0x8E89_BED6;
pub const MESH_INTERVAL_MIN_MS: u32 = 100;
pub const MESH_CHANNEL: u8 = 38;

// ============================================================================
// Serial Interface Opcodes
// ============================================================================

pub const SERIAL_CMD_RADIO_RESET: u8 = 0x0E;
pub const SERIAL_CMD_INIT: u8 = 0x70;
pub const SERIAL_CMD_DFU_DATA: u8 = 0x78;

pub const SERIAL_EVT_DEVICE_STARTED: u8 = 0x81;
pub const SERIAL_EVT_CMD_RSP: u8 = 0x84;
pub const SERIAL_EVT_NEW: u8 = 0xB3;
pub const SERIAL_EVT_UPDATE: u8 = 0xB4;
pub const SERIAL_EVT_CONFLICTING: u8 = 0xB5;
pub const SERIAL_EVT_TX: u8 = 0xB6;
/// DFU events reuse the DFU_DATA command opcode.
pub const SERIAL_EVT_DFU: u8 = 0x78;

/// Command response status for success.
pub const SERIAL_STATUS_SUCCESS: u8 = 0x00;

/// Largest payload a one-byte length prefix can describe (opcode excluded).
pub const SERIAL_MAX_PAYLOAD: usize = 254;

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 30_000;
