//! Protocol module - mesh DFU message definitions.

pub mod ack;
pub mod codec;
pub mod constants;
pub mod field;
pub mod infer;
pub mod message;
pub mod schema;

pub use ack::{Ack, AckError};
pub use codec::{CodecError, EncodeWarning, Encoded, decode, encode};
pub use constants::*;
pub use field::{Field, FieldValue};
pub use infer::{infer, infer_type};
pub use message::Message;
pub use schema::MessageType;

/// Strip the link-layer tag from an inbound DFU event payload.
pub fn strip_link_tag(payload: &[u8]) -> Option<&[u8]> {
    payload.get(LINK_TAG_LEN..)
}
