//! Type inference from raw message bytes.
//!
//! The leading handle selects the message type. `0xFFFC` is shared by
//! START_DFU and DFU_DATA: the two bytes after the handle are the reserved
//! zero field in START_DFU and the (never zero) segment number in DFU_DATA.
//! The discriminator is read little-endian, like every other field.

use super::codec::{self, CodecError};
use super::constants::*;
use super::field::Field;
use super::message::Message;
use super::schema::MessageType;

/// Resolve the message type for `bytes` without decoding the body.
pub fn infer_type(bytes: &[u8]) -> Result<MessageType, CodecError> {
    let handle = codec::read_le(Field::Handle, bytes, 0)? as u16;
    match handle {
        HANDLE_FWID => Ok(MessageType::Fwid),
        // READY_SD and READY_BOOTLOADER have no layout of their own
        HANDLE_READY => Ok(MessageType::ReadyApp),
        HANDLE_START_DATA => {
            let discriminator = codec::read_le(Field::Segment, bytes, Field::Handle.width())?;
            if discriminator == 0 {
                Ok(MessageType::StartDfu)
            } else {
                Ok(MessageType::DfuData)
            }
        }
        other => Err(CodecError::UnknownHandle(other)),
    }
}

/// Infer the message type of `bytes` and decode it.
pub fn infer(bytes: &[u8]) -> Result<Message, CodecError> {
    let kind = infer_type(bytes)?;
    codec::decode(kind, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_dfu_bytes() -> Vec<u8> {
        Message::new(MessageType::StartDfu)
            .with(Field::Reserved, 0u16)
            .with(Field::TransactionId, 42u32)
            .with(Field::StartAddr, 0x18000u32)
            .with(Field::Length, 4u32)
            .with(Field::SignLength, 0u16)
            .with(Field::Flags, 0u8)
            .encode()
            .unwrap()
            .bytes
    }

    #[test]
    fn test_infer_fwid() {
        let bytes = Message::new(MessageType::Fwid)
            .with(Field::SdVersion, 0x64u16)
            .with(Field::BlType, 1u8)
            .with(Field::BlVersion, 1u8)
            .with(Field::CompanyId, 0x59u32)
            .with(Field::AppId, 0xBEEFu16)
            .with(Field::AppVersion, 1u32)
            .encode()
            .unwrap()
            .bytes;
        let msg = infer(&bytes).unwrap();
        assert_eq!(msg.kind(), MessageType::Fwid);
        assert_eq!(msg.int(Field::Handle), Some(HANDLE_FWID as u64));
        assert_eq!(msg.int(Field::AppVersion), Some(1));
    }

    #[test]
    fn test_ready_family_resolves_to_ready_app() {
        let mut bytes = vec![0xFD, 0xFF];
        bytes.extend_from_slice(&[0u8; 16]);
        let msg = infer(&bytes).unwrap();
        assert_eq!(msg.kind(), MessageType::ReadyApp);
        assert_eq!(msg.int(Field::TransactionId), Some(0));
    }

    #[test]
    fn test_disambiguate_start_and_data() {
        let start = start_dfu_bytes();
        assert_eq!(&start[2..4], &[0x00, 0x00]);
        assert_eq!(infer(&start).unwrap().kind(), MessageType::StartDfu);

        for disc in [[0x01, 0x00], [0x00, 0x01], [0xFF, 0xFF]] {
            let mut bytes = vec![0xFC, 0xFF, disc[0], disc[1]];
            bytes.extend_from_slice(&[0u8; 20]);
            assert_eq!(infer(&bytes).unwrap().kind(), MessageType::DfuData);
        }
    }

    #[test]
    fn test_unknown_handle() {
        assert_eq!(
            infer(&[0x34, 0x12, 0, 0]).unwrap_err(),
            CodecError::UnknownHandle(0x1234)
        );
        assert_eq!(
            infer(&[0xF9, 0xFF, 0, 0]).unwrap_err(),
            CodecError::UnknownHandle(HANDLE_RELAY_REQUEST)
        );
    }

    #[test]
    fn test_data_request_handles_are_not_inferred() {
        assert_eq!(
            infer(&[0xFB, 0xFF, 0, 0]).unwrap_err(),
            CodecError::UnknownHandle(HANDLE_DATA_REQ)
        );
        assert_eq!(
            infer(&[0xFA, 0xFF]).unwrap_err(),
            CodecError::UnknownHandle(HANDLE_DATA_RSP)
        );
        assert_eq!(
            codec::decode(MessageType::DfuDataReq, &[0xFB, 0xFF]).unwrap_err(),
            CodecError::UnsupportedType(MessageType::DfuDataReq)
        );
    }

    #[test]
    fn test_truncated_handle() {
        assert!(matches!(
            infer(&[0xFE]),
            Err(CodecError::TruncatedInput {
                field: Field::Handle,
                ..
            })
        ));
        assert!(matches!(
            infer(&[0xFC, 0xFF, 0x00]),
            Err(CodecError::TruncatedInput {
                field: Field::Segment,
                ..
            })
        ));
    }
}
