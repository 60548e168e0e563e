//! serialport-based mesh gateway transport.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, info, instrument, trace, warn};

use super::frame::{Incoming, SerialFrameCodec, SerialPacket, init_payload};
use super::traits::{MeshConfig, MeshEvent, MeshTransport, TransportError};
use crate::protocol::constants::*;

/// Poll interval for a single blocking read.
const READ_POLL_MS: u64 = 100;

struct Inner {
    port: Box<dyn SerialPort>,
    codec: SerialFrameCodec,
    /// Events that arrived while a command was waiting for its response.
    pending: VecDeque<MeshEvent>,
}

/// Mesh gateway attached to a serial port.
pub struct SerialTransport {
    port_name: String,
    inner: Mutex<Inner>,
    response_timeout: Option<Duration>,
    connected: AtomicBool,
}

impl SerialTransport {
    /// Open `port_name` at `baud_rate`.
    ///
    /// `response_timeout_ms` bounds every wait for a response or event;
    /// `None` waits forever.
    #[instrument(level = "info")]
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        response_timeout_ms: Option<u64>,
    ) -> Result<Self, TransportError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(READ_POLL_MS))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                port: port_name.to_string(),
                message: e.to_string(),
            })?;

        info!(port = port_name, baud = baud_rate, "Serial port opened");

        Ok(Self {
            port_name: port_name.to_string(),
            inner: Mutex::new(Inner {
                port,
                codec: SerialFrameCodec::new(),
                pending: VecDeque::new(),
            }),
            response_timeout: response_timeout_ms.map(Duration::from_millis),
            connected: AtomicBool::new(true),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, TransportError> {
        self.inner
            .lock()
            .map_err(|_| TransportError::ReadFailed("serial port lock poisoned".into()))
    }

    fn deadline(&self) -> Option<Instant> {
        self.response_timeout.map(|t| Instant::now() + t)
    }

    fn timeout_error(&self) -> TransportError {
        TransportError::Timeout {
            timeout_ms: self
                .response_timeout
                .map(|t| t.as_millis() as u64)
                .unwrap_or_default(),
        }
    }

    fn write_packet(&self, inner: &mut Inner, opcode: u8, payload: &[u8]) -> Result<(), TransportError> {
        let frame = SerialFrameCodec::encode(opcode, payload)?;
        trace!(opcode = %format!("0x{:02X}", opcode), len = frame.len(), "Serial TX");
        inner
            .port
            .write_all(&frame)
            .and_then(|_| inner.port.flush())
            .map_err(|e| {
                self.connected.store(false, Ordering::Relaxed);
                TransportError::WriteFailed(e.to_string())
            })
    }

    fn read_packet(
        &self,
        inner: &mut Inner,
        deadline: Option<Instant>,
    ) -> Result<SerialPacket, TransportError> {
        let mut buf = [0u8; 256];
        loop {
            if let Some(packet) = inner.codec.decode() {
                trace!(opcode = %format!("0x{:02X}", packet.opcode), len = packet.payload.len(), "Serial RX");
                return Ok(packet);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(self.timeout_error());
            }
            match inner.port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => inner.codec.push(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => {
                    self.connected.store(false, Ordering::Relaxed);
                    return Err(TransportError::ReadFailed(e.to_string()));
                }
            }
        }
    }

    /// Issue a command and wait for its response, queueing events seen meanwhile.
    fn command(&self, opcode: u8, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.lock()?;
        self.write_packet(&mut inner, opcode, payload)?;

        let deadline = self.deadline();
        loop {
            let packet = self.read_packet(&mut inner, deadline)?;
            match packet.into_incoming() {
                Incoming::Response {
                    opcode: rsp_opcode,
                    status,
                    data,
                } if rsp_opcode == opcode => {
                    if status != SERIAL_STATUS_SUCCESS {
                        return Err(TransportError::CommandFailed { opcode, status });
                    }
                    return Ok(data);
                }
                Incoming::Response {
                    opcode: rsp_opcode, ..
                } => {
                    warn!(expected = %format!("0x{:02X}", opcode), got = %format!("0x{:02X}", rsp_opcode), "Ignoring stray response");
                }
                Incoming::Event(event) => {
                    debug!(event = %event, "Queueing event received during command");
                    inner.pending.push_back(event);
                }
            }
        }
    }
}

impl MeshTransport for SerialTransport {
    #[instrument(skip(self))]
    fn initialize(&self, config: &MeshConfig) -> Result<(), TransportError> {
        self.command(SERIAL_CMD_INIT, &init_payload(config))?;
        info!(
            access_address = %format!("0x{:08X}", config.access_address),
            interval_ms = config.interval_min_ms,
            channel = config.channel,
            "Mesh initialized"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    fn radio_reset(&self) -> Result<(), TransportError> {
        // The device reboots instead of answering; DEVICE_STARTED follows.
        let mut inner = self.lock()?;
        self.write_packet(&mut inner, SERIAL_CMD_RADIO_RESET, &[])
    }

    #[instrument(skip(self, payload), fields(len = payload.len()))]
    fn send_dfu(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.command(SERIAL_CMD_DFU_DATA, payload)
    }

    fn next_event(&self) -> Result<MeshEvent, TransportError> {
        let mut inner = self.lock()?;
        if let Some(event) = inner.pending.pop_front() {
            return Ok(event);
        }

        let deadline = self.deadline();
        loop {
            match self.read_packet(&mut inner, deadline)?.into_incoming() {
                Incoming::Event(event) => return Ok(event),
                Incoming::Response { opcode, status, .. } => {
                    debug!(opcode = %format!("0x{:02X}", opcode), status, "Ignoring unsolicited response");
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Names of serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    let ports = serialport::available_ports()
        .map_err(|e| TransportError::ReadFailed(format!("Failed to enumerate ports: {}", e)))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
