//! Event system for UI decoupling.
//!
//! Lets a CLI or any other front end follow a DFU session without
//! reaching into the state machine.

use std::fmt;

use crate::protocol::{Ack, MessageType};
use crate::state::machine::DfuState;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Coarse session phases, derived from [`DfuState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuPhase {
    /// Waiting for the device to announce itself.
    WaitingForDevice,
    /// FWID and READY exchange.
    Handshake,
    /// START_DFU and DFU_DATA in flight.
    Transfer,
    /// Transfer confirmed.
    Complete,
    /// Session aborted.
    Error,
}

impl DfuPhase {
    pub fn of(state: DfuState) -> Self {
        match state {
            DfuState::WaitForStarted => DfuPhase::WaitingForDevice,
            DfuState::WaitForFwid
            | DfuState::SentFwid
            | DfuState::WaitForReady
            | DfuState::SentReady => DfuPhase::Handshake,
            DfuState::SentStart | DfuState::SentData => DfuPhase::Transfer,
            DfuState::Success => DfuPhase::Complete,
            DfuState::Failure => DfuPhase::Error,
        }
    }
}

impl fmt::Display for DfuPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfuPhase::WaitingForDevice => write!(f, "Waiting for Device"),
            DfuPhase::Handshake => write!(f, "Handshake"),
            DfuPhase::Transfer => write!(f, "Transfer"),
            DfuPhase::Complete => write!(f, "Complete"),
            DfuPhase::Error => write!(f, "Error"),
        }
    }
}

/// Events emitted by a DFU session.
#[derive(Debug, Clone)]
pub enum DfuEvent {
    /// Serial device reported DEVICE_STARTED.
    DeviceStarted,
    /// Phase changed.
    PhaseChanged { from: DfuPhase, to: DfuPhase },
    /// Protocol state changed.
    StateChanged { from: DfuState, to: DfuState },
    /// DFU message received from the mesh.
    MessageReceived { kind: MessageType },
    /// DFU message encoded and sent.
    MessageSent { kind: MessageType, length: usize },
    /// Acknowledgement of the last sent message.
    AckReceived { ack: Ack },
    /// Segment progress.
    Progress { current: u64, total: u64 },
    /// Non-DFU mesh traffic seen while waiting.
    MeshEvent { description: String },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Error occurred.
    Error { message: String },
    /// Transfer confirmed by the device.
    Complete,
}

/// Observer trait for receiving DFU events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait DfuObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DfuEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DfuObserver for NullObserver {
    fn on_event(&self, _event: &DfuEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DfuObserver for TracingObserver {
    fn on_event(&self, event: &DfuEvent) {
        match event {
            DfuEvent::DeviceStarted => {
                tracing::info!("Device started");
            }
            DfuEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            DfuEvent::StateChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "State changed");
            }
            DfuEvent::MessageReceived { kind } => {
                tracing::debug!(kind = %kind, "RX");
            }
            DfuEvent::MessageSent { kind, length } => {
                tracing::debug!(kind = %kind, len = length, "TX");
            }
            DfuEvent::AckReceived { ack } => {
                tracing::debug!(ack = %ack, "ACK received");
            }
            DfuEvent::Progress { current, total } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(segment = current, total = total, progress = %format!("{}%", pct), "Progress");
            }
            DfuEvent::MeshEvent { description } => {
                tracing::trace!("Mesh: {}", description);
            }
            DfuEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            DfuEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
            DfuEvent::Complete => {
                tracing::info!("DFU complete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_of_state() {
        assert_eq!(DfuPhase::of(DfuState::WaitForStarted), DfuPhase::WaitingForDevice);
        assert_eq!(DfuPhase::of(DfuState::SentReady), DfuPhase::Handshake);
        assert_eq!(DfuPhase::of(DfuState::SentData), DfuPhase::Transfer);
        assert_eq!(DfuPhase::of(DfuState::Success), DfuPhase::Complete);
        assert_eq!(DfuPhase::of(DfuState::Failure), DfuPhase::Error);
    }
}
