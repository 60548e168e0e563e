//! Message schema registry.
//!
//! Maps each message type to its ordered field list and its canonical
//! handle. Field order is wire order.

use std::fmt;

use super::constants::*;
use super::field::Field;

/// Named DFU message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Fwid,
    ReadyApp,
    ReadySd,
    ReadyBootloader,
    StartDfu,
    DfuData,
    DfuDataReq,
    DfuDataRsp,
    RelayRequest,
}

const FWID_FIELDS: &[Field] = &[
    Field::Handle,
    Field::SdVersion,
    Field::BlType,
    Field::BlVersion,
    Field::CompanyId,
    Field::AppId,
    Field::AppVersion,
];

const READY_APP_FIELDS: &[Field] = &[
    Field::Handle,
    Field::Type,
    Field::Authority,
    Field::TransactionId,
    Field::CompanyId,
    Field::AppId,
    Field::AppVersion,
];

const START_DFU_FIELDS: &[Field] = &[
    Field::Handle,
    Field::Reserved,
    Field::TransactionId,
    Field::StartAddr,
    Field::Length,
    Field::SignLength,
    Field::Flags,
];

const DFU_DATA_FIELDS: &[Field] = &[
    Field::Handle,
    Field::Segment,
    Field::TransactionId,
    Field::DataSegment,
];

impl MessageType {
    pub const ALL: [MessageType; 9] = [
        MessageType::Fwid,
        MessageType::ReadyApp,
        MessageType::ReadySd,
        MessageType::ReadyBootloader,
        MessageType::StartDfu,
        MessageType::DfuData,
        MessageType::DfuDataReq,
        MessageType::DfuDataRsp,
        MessageType::RelayRequest,
    ];

    /// Ordered field layout, or `None` for types declared without one.
    pub fn schema(self) -> Option<&'static [Field]> {
        match self {
            MessageType::Fwid => Some(FWID_FIELDS),
            MessageType::ReadyApp => Some(READY_APP_FIELDS),
            MessageType::StartDfu => Some(START_DFU_FIELDS),
            MessageType::DfuData => Some(DFU_DATA_FIELDS),
            MessageType::ReadySd
            | MessageType::ReadyBootloader
            | MessageType::DfuDataReq
            | MessageType::DfuDataRsp
            | MessageType::RelayRequest => None,
        }
    }

    /// Canonical handle, used to fill in a missing `handle` field.
    pub const fn handle(self) -> u16 {
        match self {
            MessageType::Fwid => HANDLE_FWID,
            MessageType::ReadyApp | MessageType::ReadySd | MessageType::ReadyBootloader => {
                HANDLE_READY
            }
            MessageType::StartDfu | MessageType::DfuData => HANDLE_START_DATA,
            MessageType::DfuDataReq => HANDLE_DATA_REQ,
            MessageType::DfuDataRsp => HANDLE_DATA_RSP,
            MessageType::RelayRequest => HANDLE_RELAY_REQUEST,
        }
    }

    /// Total encoded size, if the type has a layout.
    pub fn encoded_len(self) -> Option<usize> {
        self.schema()
            .map(|fields| fields.iter().map(|f| f.width()).sum())
    }

    pub const fn name(self) -> &'static str {
        match self {
            MessageType::Fwid => "FWID",
            MessageType::ReadyApp => "READY_APP",
            MessageType::ReadySd => "READY_SD",
            MessageType::ReadyBootloader => "READY_BOOTLOADER",
            MessageType::StartDfu => "START_DFU",
            MessageType::DfuData => "DFU_DATA",
            MessageType::DfuDataReq => "DFU_DATA_REQ",
            MessageType::DfuDataRsp => "DFU_DATA_RSP",
            MessageType::RelayRequest => "RELAY_REQUEST",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
