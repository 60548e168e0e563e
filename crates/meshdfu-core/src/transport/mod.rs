//! Transport layer module.

pub mod frame;
pub mod mock;
pub mod serial;
pub mod traits;

pub use frame::{SerialFrameCodec, SerialPacket};
pub use mock::MockTransport;
pub use serial::{SerialTransport, available_ports};
pub use traits::{MeshConfig, MeshEvent, MeshTransport, TransportError};
