//! Serial packet framing for the mesh gateway.
//!
//! Every packet on the wire is a length byte followed by an opcode and its
//! payload. The length counts the opcode and payload, not itself.
//!
//! ```text
//! +-----+--------+------------------+
//! | len | opcode | payload[len - 1] |
//! +-----+--------+------------------+
//! ```

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BufMut, BytesMut};

use super::traits::{MeshConfig, MeshEvent, TransportError};
use crate::protocol::constants::*;

/// One decoded serial packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPacket {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

/// What a packet from the device means to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Response to a command we issued.
    Response {
        opcode: u8,
        status: u8,
        data: Vec<u8>,
    },
    /// Unsolicited event.
    Event(MeshEvent),
}

impl SerialPacket {
    pub fn new(opcode: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Classify a packet received from the device.
    pub fn into_incoming(self) -> Incoming {
        let SerialPacket { opcode, payload } = self;
        match opcode {
            SERIAL_EVT_CMD_RSP if payload.len() >= 2 => Incoming::Response {
                opcode: payload[0],
                status: payload[1],
                data: payload[2..].to_vec(),
            },
            SERIAL_EVT_DEVICE_STARTED => Incoming::Event(MeshEvent::DeviceStarted(payload)),
            SERIAL_EVT_DFU => Incoming::Event(MeshEvent::Dfu(payload)),
            SERIAL_EVT_NEW | SERIAL_EVT_UPDATE | SERIAL_EVT_CONFLICTING | SERIAL_EVT_TX
                if payload.len() >= 2 =>
            {
                let handle = LittleEndian::read_u16(&payload[..2]);
                let data = payload[2..].to_vec();
                Incoming::Event(match opcode {
                    SERIAL_EVT_NEW => MeshEvent::New { handle, data },
                    SERIAL_EVT_UPDATE => MeshEvent::Update { handle, data },
                    SERIAL_EVT_CONFLICTING => MeshEvent::Conflicting { handle, data },
                    _ => MeshEvent::Tx { handle, data },
                })
            }
            _ => Incoming::Event(MeshEvent::Unknown { opcode, payload }),
        }
    }
}

/// Incremental decoder and encoder for serial packets.
#[derive(Debug, Default)]
pub struct SerialFrameCodec {
    buffer: BytesMut,
}

impl SerialFrameCodec {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(2 * (SERIAL_MAX_PAYLOAD + 2)),
        }
    }

    /// Add received bytes to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take one complete packet from the buffer.
    pub fn decode(&mut self) -> Option<SerialPacket> {
        // A zero length byte cannot start a packet; resync past it.
        while self.buffer.first() == Some(&0) {
            self.buffer.advance(1);
        }
        let len = *self.buffer.first()? as usize;
        if self.buffer.len() < 1 + len {
            return None;
        }
        self.buffer.advance(1);
        let opcode = self.buffer.get_u8();
        let payload = self.buffer.split_to(len - 1).to_vec();
        Some(SerialPacket { opcode, payload })
    }

    /// Frame a command for transmission.
    pub fn encode(opcode: u8, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        if payload.len() > SERIAL_MAX_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: SERIAL_MAX_PAYLOAD,
            });
        }
        let mut buf = Vec::with_capacity(2 + payload.len());
        buf.put_u8((payload.len() + 1) as u8);
        buf.put_u8(opcode);
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// INIT payload: access address, minimum interval, channel.
pub fn init_payload(config: &MeshConfig) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    buf.put_u32_le(config.access_address);
    buf.put_u32_le(config.interval_min_ms);
    buf.put_u8(config.channel);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = SerialFrameCodec::encode(SERIAL_CMD_DFU_DATA, &[0xFE, 0xFF, 0x01]).unwrap();
        assert_eq!(frame, vec![0x04, 0x78, 0xFE, 0xFF, 0x01]);

        let empty = SerialFrameCodec::encode(SERIAL_CMD_RADIO_RESET, &[]).unwrap();
        assert_eq!(empty, vec![0x01, 0x0E]);
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let payload = vec![0u8; SERIAL_MAX_PAYLOAD + 1];
        assert!(matches!(
            SerialFrameCodec::encode(SERIAL_CMD_DFU_DATA, &payload),
            Err(TransportError::PayloadTooLarge { len: 255, max: 254 })
        ));
    }

    #[test]
    fn test_decode_partial_and_multiple() {
        let mut codec = SerialFrameCodec::new();
        codec.push(&[0x03, 0x84, 0x70]);
        assert!(codec.decode().is_none());

        codec.push(&[0x00, 0x02, 0x81, 0xAA]);
        assert_eq!(
            codec.decode(),
            Some(SerialPacket::new(SERIAL_EVT_CMD_RSP, vec![0x70, 0x00]))
        );
        assert_eq!(
            codec.decode(),
            Some(SerialPacket::new(SERIAL_EVT_DEVICE_STARTED, vec![0xAA]))
        );
        assert!(codec.decode().is_none());
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_decode_skips_zero_length() {
        let mut codec = SerialFrameCodec::new();
        codec.push(&[0x00, 0x00, 0x01, 0x81]);
        assert_eq!(
            codec.decode(),
            Some(SerialPacket::new(SERIAL_EVT_DEVICE_STARTED, Vec::new()))
        );
    }

    #[test]
    fn test_classify_packets() {
        let rsp = SerialPacket::new(SERIAL_EVT_CMD_RSP, vec![0x78, 0x00, 0xFE, 0xFF]);
        assert_eq!(
            rsp.into_incoming(),
            Incoming::Response {
                opcode: SERIAL_CMD_DFU_DATA,
                status: SERIAL_STATUS_SUCCESS,
                data: vec![0xFE, 0xFF],
            }
        );

        let dfu = SerialPacket::new(SERIAL_EVT_DFU, vec![0x01, 0x02, 0xFE, 0xFF]);
        assert_eq!(
            dfu.into_incoming(),
            Incoming::Event(MeshEvent::Dfu(vec![0x01, 0x02, 0xFE, 0xFF]))
        );

        let update = SerialPacket::new(SERIAL_EVT_UPDATE, vec![0x0A, 0x00, b'h', b'i']);
        assert_eq!(
            update.into_incoming(),
            Incoming::Event(MeshEvent::Update {
                handle: 10,
                data: b"hi".to_vec()
            })
        );

        let odd = SerialPacket::new(0x42, vec![0x01]);
        assert_eq!(
            odd.into_incoming(),
            Incoming::Event(MeshEvent::Unknown {
                opcode: 0x42,
                payload: vec![0x01]
            })
        );
    }

    #[test]
    fn test_init_payload() {
        let payload = init_payload(&MeshConfig::default());
        assert_eq!(payload, vec![0xD6, 0xBE, 0x89, 0x8E, 100, 0, 0, 0, 38]);
    }
}
