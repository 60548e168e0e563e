//! MeshDFU-Core: firmware update over a BLE mesh serial gateway.
//!
//! This crate implements the host side of the mesh DFU handshake: firmware
//! identification, transfer negotiation, and segmented firmware transfer
//! gated by acknowledgements.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Field and message schemas, codec, type inference, acks
//! - **Payload**: Firmware image loading and segmentation
//! - **State**: State machine and transition handlers
//! - **Transport**: Mesh gateway abstraction (serial, mock)
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use meshdfu_core::session::{DfuSession, SessionConfig};
//! use meshdfu_core::transport::SerialTransport;
//!
//! let config = SessionConfig {
//!     port: Some("/dev/ttyACM0".to_string()),
//!     firmware_path: Some("test-app.bin".to_string()),
//!     ..Default::default()
//! };
//!
//! let transport = SerialTransport::open("/dev/ttyACM0", config.baud_rate, config.response_timeout())
//!     .expect("open port");
//! let mut session = DfuSession::new(config, transport);
//! session.run().expect("DFU failed");
//! ```

pub mod events;
pub mod payload;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use events::{DfuEvent, DfuObserver, DfuPhase, LogLevel, NullObserver, TracingObserver};
pub use payload::{FirmwareError, FirmwareImage, SegmentCursor};
pub use protocol::{Ack, CodecError, Field, FieldValue, Message, MessageType};
pub use session::{DfuSession, LocalIdentity, SessionConfig, SessionReport, TransferParams};
pub use state::{DfuState, SessionRecord, StepError};
pub use transport::{MeshConfig, MeshEvent, MeshTransport, MockTransport, SerialTransport, TransportError};
