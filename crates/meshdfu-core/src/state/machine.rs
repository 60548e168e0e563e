//! DFU session state and bookkeeping.

use std::fmt;

use crate::payload::SegmentCursor;
use crate::protocol::MessageType;

/// Protocol state of the DFU session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DfuState {
    /// Initial state, before the device has announced itself.
    #[default]
    WaitForStarted,
    /// Waiting for the device's FWID.
    WaitForFwid,
    /// Our FWID reply is in flight.
    SentFwid,
    /// Waiting for the device's READY_APP.
    WaitForReady,
    /// Our READY_APP request is in flight.
    SentReady,
    /// START_DFU sent.
    SentStart,
    /// Data segments in flight or drained.
    SentData,
    /// Transfer confirmed by the device.
    Success,
    /// Session aborted.
    Failure,
}

impl fmt::Display for DfuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfuState::WaitForStarted => write!(f, "WAIT_FOR_STARTED"),
            DfuState::WaitForFwid => write!(f, "WAIT_FOR_FWID"),
            DfuState::SentFwid => write!(f, "SENT_FWID"),
            DfuState::WaitForReady => write!(f, "WAIT_FOR_READY"),
            DfuState::SentReady => write!(f, "SENT_READY"),
            DfuState::SentStart => write!(f, "SENT_START"),
            DfuState::SentData => write!(f, "SENT_DATA"),
            DfuState::Success => write!(f, "SUCCESS"),
            DfuState::Failure => write!(f, "FAILURE"),
        }
    }
}

impl DfuState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DfuState::Success | DfuState::Failure)
    }

    /// Whether the transfer phase (START onwards) has been reached.
    pub fn is_transfer(&self) -> bool {
        matches!(self, DfuState::SentStart | DfuState::SentData)
    }

    /// Waiting state that would normally expect a message of `kind`.
    pub fn safe_state_for(kind: MessageType) -> Option<DfuState> {
        match kind {
            MessageType::Fwid => Some(DfuState::WaitForFwid),
            MessageType::ReadyApp | MessageType::ReadySd | MessageType::ReadyBootloader => {
                Some(DfuState::WaitForReady)
            }
            _ => None,
        }
    }
}

/// Mutable record of one DFU session.
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    /// Current protocol state.
    pub state: DfuState,
    /// Transaction id negotiated in READY_APP.
    pub transaction_id: Option<u32>,
    /// Segment cursor.
    pub cursor: SegmentCursor,
}

impl SessionRecord {
    pub fn new(total_segments: usize) -> Self {
        Self {
            state: DfuState::WaitForStarted,
            transaction_id: None,
            cursor: SegmentCursor::new(total_segments),
        }
    }

    /// Transition to a new state.
    pub fn goto_state(&mut self, new_state: DfuState) {
        if self.state != new_state {
            tracing::info!(from = %self.state, to = %new_state, "State transition");
        }
        self.state = new_state;
    }

    /// Forget transfer bookkeeping ahead of a new handshake.
    pub fn restart(&mut self) {
        self.transaction_id = None;
        self.cursor.reset();
    }

    pub fn should_continue(&self) -> bool {
        !self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_states() {
        assert_eq!(
            DfuState::safe_state_for(MessageType::Fwid),
            Some(DfuState::WaitForFwid)
        );
        for kind in [
            MessageType::ReadyApp,
            MessageType::ReadySd,
            MessageType::ReadyBootloader,
        ] {
            assert_eq!(DfuState::safe_state_for(kind), Some(DfuState::WaitForReady));
        }
        assert_eq!(DfuState::safe_state_for(MessageType::StartDfu), None);
        assert_eq!(DfuState::safe_state_for(MessageType::DfuData), None);
    }

    #[test]
    fn test_record_restart() {
        let mut record = SessionRecord::new(4);
        record.transaction_id = Some(99);
        record.cursor.advance();
        record.cursor.advance();
        record.restart();
        assert_eq!(record.transaction_id, None);
        assert_eq!(record.cursor.next, 1);
        assert_eq!(record.cursor.total, 4);
    }

    #[test]
    fn test_display_and_terminal() {
        assert_eq!(DfuState::default().to_string(), "WAIT_FOR_STARTED");
        assert!(DfuState::Success.is_terminal());
        assert!(DfuState::Failure.is_terminal());
        assert!(!DfuState::SentData.is_terminal());
    }
}
