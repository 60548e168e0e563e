//! DFU Session - High-level orchestrator for the update process.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::events::{DfuEvent, DfuObserver, DfuPhase, LogLevel, TracingObserver};
use crate::payload::FirmwareImage;
use crate::protocol::constants::*;
use crate::protocol::{Ack, Message, MessageType, infer, strip_link_tag};
use crate::state::handlers::{HandlerContext, on_ack, step};
use crate::state::machine::{DfuState, SessionRecord};
use crate::transport::{MeshConfig, MeshEvent, MeshTransport};

/// Firmware identity we announce in FWID and READY_APP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalIdentity {
    pub sd_version: u16,
    pub bl_type: u8,
    pub bl_version: u8,
    pub company_id: u32,
    pub app_id: u16,
    /// Version being installed. The device reporting it back means success.
    pub app_version: u32,
}

impl Default for LocalIdentity {
    fn default() -> Self {
        Self {
            sd_version: DEFAULT_SD_VERSION,
            bl_type: DEFAULT_BL_TYPE,
            bl_version: DEFAULT_BL_VERSION,
            company_id: DEFAULT_COMPANY_ID,
            app_id: DEFAULT_APP_ID,
            app_version: DEFAULT_APP_VERSION,
        }
    }
}

/// Parameters of the transfer window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferParams {
    /// READY_APP `type`.
    pub dfu_type: u8,
    pub authority: u8,
    pub start_address: u32,
    pub flags: u8,
}

impl Default for TransferParams {
    fn default() -> Self {
        Self {
            dfu_type: DEFAULT_DFU_TYPE,
            authority: DEFAULT_AUTHORITY,
            start_address: DEFAULT_START_ADDRESS,
            flags: DEFAULT_START_FLAGS,
        }
    }
}

/// Configuration for a DFU session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port of the mesh gateway.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Path to the firmware binary.
    pub firmware_path: Option<String>,
    /// Reset the radio before joining the mesh.
    pub reset_radio: bool,
    /// Wait limit for a response or event. `None` or `0` waits forever.
    pub response_timeout_ms: Option<u64>,
    pub mesh: MeshConfig,
    pub identity: LocalIdentity,
    pub transfer: TransferParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            firmware_path: None,
            reset_radio: true,
            response_timeout_ms: Some(DEFAULT_RESPONSE_TIMEOUT_MS),
            mesh: MeshConfig::default(),
            identity: LocalIdentity::default(),
            transfer: TransferParams::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Effective response timeout.
    pub fn response_timeout(&self) -> Option<u64> {
        self.response_timeout_ms.filter(|&ms| ms > 0)
    }
}

/// Outcome of a successful session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Final session record.
    pub record: SessionRecord,
    /// DFU_DATA messages sent, across restarts.
    pub segments_sent: usize,
    /// DFU messages sent in total.
    pub messages_sent: usize,
}

/// DFU Session - drives one firmware update over a mesh transport.
pub struct DfuSession<T: MeshTransport, O: DfuObserver> {
    config: SessionConfig,
    transport: T,
    observer: Arc<O>,
    rng: StdRng,
}

impl<T: MeshTransport> DfuSession<T, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig, transport: T) -> Self {
        Self::with_observer(config, transport, Arc::new(TracingObserver))
    }
}

impl<T: MeshTransport, O: DfuObserver> DfuSession<T, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, transport: T, observer: Arc<O>) -> Self {
        Self {
            config,
            transport,
            observer,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed random source for transaction ids.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Load the configured firmware and run the session.
    pub fn run(&mut self) -> Result<SessionReport> {
        let path = self
            .config
            .firmware_path
            .clone()
            .ok_or_else(|| anyhow!("No firmware path configured"))?;
        info!(path = %path, "Loading firmware");
        let firmware = FirmwareImage::load(&path)
            .with_context(|| format!("Failed to load firmware from {}", path))?;
        self.run_with_firmware(&firmware)
    }

    /// Run the session with an already loaded image.
    #[instrument(skip(self, firmware), fields(firmware_len = firmware.len()))]
    pub fn run_with_firmware(&mut self, firmware: &FirmwareImage) -> Result<SessionReport> {
        let mut record = SessionRecord::new(firmware.segment_count());
        let mut counters = Counters::new(DfuPhase::of(record.state));

        match self.drive(firmware, &mut record, &mut counters) {
            Ok(()) => {
                info!(
                    segments = counters.segments_sent,
                    messages = counters.messages_sent,
                    "DFU session finished"
                );
                Ok(SessionReport {
                    record,
                    segments_sent: counters.segments_sent,
                    messages_sent: counters.messages_sent,
                })
            }
            Err(e) => {
                if record.state != DfuState::Failure {
                    self.observer.on_event(&DfuEvent::Error {
                        message: format!("{:#}", e),
                    });
                    record.goto_state(DfuState::Failure);
                }
                report_phase(self.observer.as_ref(), &mut counters.phase, record.state);
                Err(e)
            }
        }
    }

    fn drive(
        &mut self,
        firmware: &FirmwareImage,
        record: &mut SessionRecord,
        counters: &mut Counters,
    ) -> Result<()> {
        let Self {
            config,
            transport,
            observer,
            rng,
        } = self;
        let observer: &O = observer;

        if config.reset_radio {
            transport.radio_reset().context("Radio reset failed")?;
            info!("Radio reset requested");
        }
        transport
            .initialize(&config.mesh)
            .context("Mesh initialization failed")?;
        observer.on_event(&DfuEvent::Log {
            level: LogLevel::Info,
            message: "Listening to the mesh".into(),
        });

        let mut ctx = HandlerContext {
            identity: &config.identity,
            transfer: &config.transfer,
            firmware,
            observer,
            rng,
        };
        while record.should_continue() {
            let event = transport
                .next_event()
                .with_context(|| format!("Waiting for device in state {}", record.state))?;

            let payload = match event {
                MeshEvent::Dfu(payload) => payload,
                MeshEvent::DeviceStarted(_) => {
                    observer.on_event(&DfuEvent::DeviceStarted);
                    continue;
                }
                other => {
                    observer.on_event(&DfuEvent::MeshEvent {
                        description: other.to_string(),
                    });
                    continue;
                }
            };

            let bytes = strip_link_tag(&payload).ok_or_else(|| {
                anyhow!(
                    "DFU event of {} bytes is shorter than its link tag",
                    payload.len()
                )
            })?;
            let message = infer(bytes).context("Failed to decode DFU event")?;
            tracing::debug!(message = ?message, "DFU message received");

            let mut outgoing = step(record, &message, &mut ctx)?.outgoing;
            report_phase(observer, &mut counters.phase, record.state);

            while let Some(message) = outgoing.take() {
                let kind = message.kind();
                let ack = send(transport, observer, &message, counters)?;
                outgoing = on_ack(record, kind, ack, &mut ctx)?.outgoing;
                report_phase(observer, &mut counters.phase, record.state);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Counters {
    segments_sent: usize,
    messages_sent: usize,
    /// Last phase reported to the observer.
    phase: DfuPhase,
}

impl Counters {
    fn new(phase: DfuPhase) -> Self {
        Self {
            segments_sent: 0,
            messages_sent: 0,
            phase,
        }
    }
}

/// Encode, send and parse the acknowledgement of one message.
fn send<T: MeshTransport, O: DfuObserver>(
    transport: &T,
    observer: &O,
    message: &Message,
    counters: &mut Counters,
) -> Result<Ack> {
    let encoded = message
        .encode()
        .with_context(|| format!("Failed to encode {}", message.kind()))?;
    for warning in &encoded.warnings {
        warn!(%warning, "Encode warning");
        observer.on_event(&DfuEvent::Log {
            level: LogLevel::Warn,
            message: warning.to_string(),
        });
    }

    let response = transport
        .send_dfu(&encoded.bytes)
        .with_context(|| format!("Failed to send {}", message.kind()))?;
    counters.messages_sent += 1;
    if message.kind() == MessageType::DfuData {
        counters.segments_sent += 1;
    }
    observer.on_event(&DfuEvent::MessageSent {
        kind: message.kind(),
        length: encoded.bytes.len(),
    });

    Ok(Ack::from_response(&response)?)
}

fn report_phase<O: DfuObserver>(observer: &O, phase: &mut DfuPhase, state: DfuState) {
    let next = DfuPhase::of(state);
    if next != *phase {
        observer.on_event(&DfuEvent::PhaseChanged {
            from: *phase,
            to: next,
        });
        *phase = next;
    }
}
