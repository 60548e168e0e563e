//! Field names, the process-wide width table, and field values.
//!
//! A field's width is fixed by its name and is the same in every message
//! type that carries it.

use std::fmt;
use std::str::FromStr;

/// Every field name used by any message schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Handle,
    SdVersion,
    BlType,
    BlVersion,
    CompanyId,
    AppId,
    AppVersion,
    Type,
    Authority,
    TransactionId,
    /// Two zero bytes after the START_DFU handle (wire name `0`).
    Reserved,
    StartAddr,
    Length,
    SignLength,
    Flags,
    Segment,
    DataSegment,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::Handle,
        Field::SdVersion,
        Field::BlType,
        Field::BlVersion,
        Field::CompanyId,
        Field::AppId,
        Field::AppVersion,
        Field::Type,
        Field::Authority,
        Field::TransactionId,
        Field::Reserved,
        Field::StartAddr,
        Field::Length,
        Field::SignLength,
        Field::Flags,
        Field::Segment,
        Field::DataSegment,
    ];

    /// Width in bytes on the wire.
    pub const fn width(self) -> usize {
        match self {
            Field::BlType | Field::BlVersion | Field::Type | Field::Authority | Field::Flags => 1,
            Field::Handle
            | Field::SdVersion
            | Field::AppId
            | Field::Reserved
            | Field::SignLength
            | Field::Segment => 2,
            Field::CompanyId
            | Field::AppVersion
            | Field::TransactionId
            | Field::StartAddr
            | Field::Length => 4,
            Field::DataSegment => 16,
        }
    }

    /// Largest integer the field can carry.
    pub const fn max_value(self) -> u64 {
        let width = self.width();
        if width >= 8 {
            u64::MAX
        } else {
            (1u64 << (width * 8)) - 1
        }
    }

    /// Whether decode yields an integer (`true`) or raw bytes.
    pub const fn is_integer(self) -> bool {
        self.width() <= 8
    }

    /// Name used in the protocol documentation and diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Field::Handle => "handle",
            Field::SdVersion => "sdVersion",
            Field::BlType => "blType",
            Field::BlVersion => "blVersion",
            Field::CompanyId => "companyId",
            Field::AppId => "appId",
            Field::AppVersion => "appVersion",
            Field::Type => "type",
            Field::Authority => "authority",
            Field::TransactionId => "transactionId",
            Field::Reserved => "0",
            Field::StartAddr => "startAddr",
            Field::Length => "length",
            Field::SignLength => "signLength",
            Field::Flags => "flags",
            Field::Segment => "segment",
            Field::DataSegment => "dataSegment",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecognized field name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field name: {0}")]
pub struct UnknownField(pub String);

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.name() == s || (s == "reserved" && *f == Field::Reserved))
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

/// A field's value.
#[derive(Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Unsigned integer, written little-endian and zero-padded to width.
    Int(u64),
    /// Pre-encoded bytes, written verbatim in transmission order.
    Raw(Vec<u8>),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<u64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Int(_) => None,
            FieldValue::Raw(bytes) => Some(bytes),
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "0x{:X}", v),
            FieldValue::Raw(bytes) => {
                write!(f, "[")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(bytes: Vec<u8>) -> Self {
        FieldValue::Raw(bytes)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(bytes: &[u8]) -> Self {
        FieldValue::Raw(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observed_widths() {
        assert_eq!(Field::Handle.width(), 2);
        assert_eq!(Field::BlType.width(), 1);
        assert_eq!(Field::CompanyId.width(), 4);
        assert_eq!(Field::DataSegment.width(), 16);
        assert!(Field::ALL.iter().all(|f| (1..=32).contains(&f.width())));
    }

    #[test]
    fn test_max_value() {
        assert_eq!(Field::Flags.max_value(), 0xFF);
        assert_eq!(Field::Segment.max_value(), 0xFFFF);
        assert_eq!(Field::TransactionId.max_value(), 0xFFFF_FFFF);
        assert_eq!(Field::DataSegment.max_value(), u64::MAX);
    }

    #[test]
    fn test_name_parse() {
        for field in Field::ALL {
            assert_eq!(field.name().parse::<Field>().unwrap(), field);
        }
        assert_eq!("reserved".parse::<Field>().unwrap(), Field::Reserved);
        assert!("trasnactionId".parse::<Field>().is_err());
    }
}
