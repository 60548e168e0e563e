//! Message codec.
//!
//! Integers go on the wire little-endian, zero-padded to the field width.
//! Raw values are copied verbatim and zero-padded. Decode walks the schema
//! and ignores any bytes past the last field.

use std::collections::BTreeMap;
use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use super::field::{Field, FieldValue};
use super::message::Message;
use super::schema::MessageType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported message type: {0}")]
    UnsupportedType(MessageType),
    #[error("Number in field {field} too large: 0x{value:X}. Max is 0x{max:X}")]
    FieldOverflow { field: Field, value: u64, max: u64 },
    #[error("Payload for field {field} is {len} bytes, field holds {width}")]
    PayloadOverflow {
        field: Field,
        len: usize,
        width: usize,
    },
    #[error("{kind} is missing field {field}")]
    MissingField { kind: MessageType, field: Field },
    #[error("Truncated input at field {field}: need {needed} bytes, {available} available")]
    TruncatedInput {
        field: Field,
        needed: usize,
        available: usize,
    },
    #[error("Unknown handle: 0x{0:04X}")]
    UnknownHandle(u16),
}

/// Non-fatal diagnostic raised while encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeWarning {
    /// A supplied field is not part of the type's schema and was ignored.
    UnrecognizedField { kind: MessageType, field: Field },
}

impl fmt::Display for EncodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeWarning::UnrecognizedField { kind, field } => {
                write!(f, "did you misspell field {} of msgtype {}?", field, kind)
            }
        }
    }
}

/// Encoded bytes plus any diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub warnings: Vec<EncodeWarning>,
}

fn schema_of(kind: MessageType) -> Result<&'static [Field], CodecError> {
    kind.schema()
        .filter(|fields| !fields.is_empty())
        .ok_or(CodecError::UnsupportedType(kind))
}

/// Encode `fields` as a message of type `kind`.
///
/// A missing `handle` is filled in from the type's canonical handle.
pub fn encode(
    kind: MessageType,
    fields: &BTreeMap<Field, FieldValue>,
) -> Result<Encoded, CodecError> {
    let schema = schema_of(kind)?;

    let warnings: Vec<EncodeWarning> = fields
        .keys()
        .filter(|field| !schema.contains(field))
        .map(|&field| EncodeWarning::UnrecognizedField { kind, field })
        .collect();

    let default_handle = FieldValue::Int(kind.handle().into());
    let mut bytes = Vec::with_capacity(kind.encoded_len().unwrap_or(0));
    for &field in schema {
        let value = match fields.get(&field) {
            Some(value) => value,
            None if field == Field::Handle => &default_handle,
            None => return Err(CodecError::MissingField { kind, field }),
        };
        encode_field(field, value, &mut bytes)?;
    }

    Ok(Encoded { bytes, warnings })
}

fn encode_field(field: Field, value: &FieldValue, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let width = field.width();
    let start = out.len();
    match value {
        FieldValue::Int(v) => {
            if *v > field.max_value() {
                return Err(CodecError::FieldOverflow {
                    field,
                    value: *v,
                    max: field.max_value(),
                });
            }
            out.resize(start + width, 0);
            if width <= 8 {
                LittleEndian::write_uint(&mut out[start..], *v, width);
            } else {
                LittleEndian::write_u64(&mut out[start..start + 8], *v);
            }
        }
        FieldValue::Raw(raw) => {
            if raw.len() > width {
                return Err(CodecError::PayloadOverflow {
                    field,
                    len: raw.len(),
                    width,
                });
            }
            out.extend_from_slice(raw);
            out.resize(start + width, 0);
        }
    }
    Ok(())
}

/// Decode `bytes` as a message of type `kind`.
///
/// Fields up to eight bytes wide decode to integers; wider fields come back
/// as raw bytes in transmission order.
pub fn decode(kind: MessageType, bytes: &[u8]) -> Result<Message, CodecError> {
    let schema = schema_of(kind)?;

    let mut fields = BTreeMap::new();
    let mut rest = bytes;
    for &field in schema {
        let width = field.width();
        if rest.len() < width {
            return Err(CodecError::TruncatedInput {
                field,
                needed: width,
                available: rest.len(),
            });
        }
        let (chunk, tail) = rest.split_at(width);
        fields.insert(field, decode_field(field, chunk));
        rest = tail;
    }

    Ok(Message::from_fields(kind, fields))
}

fn decode_field(field: Field, chunk: &[u8]) -> FieldValue {
    if field.is_integer() {
        FieldValue::Int(LittleEndian::read_uint(chunk, chunk.len()))
    } else {
        FieldValue::Raw(chunk.to_vec())
    }
}

/// Read a little-endian integer from the front of `bytes`.
pub(crate) fn read_le(field: Field, bytes: &[u8], offset: usize) -> Result<u64, CodecError> {
    let width = field.width();
    let available = bytes.len().saturating_sub(offset);
    if available < width {
        return Err(CodecError::TruncatedInput {
            field,
            needed: width,
            available,
        });
    }
    Ok(LittleEndian::read_uint(&bytes[offset..], width))
}
