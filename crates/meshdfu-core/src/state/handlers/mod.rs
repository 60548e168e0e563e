//! Transition logic - dispatch for inbound messages and acks.
//!
//! This module is split into submodules by functionality:
//! - `handshake`: FWID and READY exchanges
//! - `transfer`: START_DFU and segmented DFU_DATA
//! - `control`: completion, restart and safe-state fallback
//!
//! Transitions never touch the transport. They update the [`SessionRecord`]
//! and hand back the message to send next, if any.

mod control;
mod handshake;
mod transfer;

use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::events::{DfuEvent, DfuObserver, LogLevel};
use crate::payload::FirmwareImage;
use crate::protocol::constants::*;
use crate::protocol::{Ack, Message, MessageType};
use crate::session::{LocalIdentity, TransferParams};
use crate::state::machine::{DfuState, SessionRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("Unexpected {kind} in state {state}")]
    UnexpectedTransition { state: DfuState, kind: MessageType },
    #[error("No safe state for unexpected {kind}")]
    NoSafeState { kind: MessageType },
    #[error("Unexpected ack {ack} in state {state}")]
    UnexpectedAck { state: DfuState, ack: Ack },
    #[error("Ack mismatch: sent handle 0x{expected:04X}, device acknowledged 0x{actual:04X}")]
    AckMismatch { expected: u16, actual: u16 },
    #[error("No transaction id has been negotiated")]
    NoTransaction,
    #[error("Segment {segment} is outside the image ({total} segments)")]
    SegmentOutOfRange { segment: usize, total: usize },
    #[error("Session already finished in state {0}")]
    Terminated(DfuState),
    #[error("Gave up after {limit} safe-state redispatches")]
    RedispatchLimit { limit: usize },
}

/// Outcome of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the transition.
    pub next: DfuState,
    /// Message to send, if any.
    pub outgoing: Option<Message>,
}

impl Transition {
    fn to(next: DfuState) -> Self {
        Self {
            next,
            outgoing: None,
        }
    }

    fn send(next: DfuState, message: Message) -> Self {
        Self {
            next,
            outgoing: Some(message),
        }
    }
}

/// Result of dispatching in one state.
enum Dispatch {
    Done(Transition),
    /// Retry as if the session were in this state.
    Redispatch(DfuState),
}

/// Everything a transition may read besides the session record.
pub struct HandlerContext<'a, O: DfuObserver, R: Rng> {
    pub identity: &'a LocalIdentity,
    pub transfer: &'a TransferParams,
    pub firmware: &'a FirmwareImage,
    pub observer: &'a O,
    pub rng: &'a mut R,
}

impl<'a, O: DfuObserver, R: Rng> HandlerContext<'a, O, R> {
    pub(crate) fn emit(&self, event: DfuEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(DfuEvent::Log {
            level,
            message: message.into(),
        });
    }
}

/// Apply an inbound message to the session.
///
/// Unexpected messages are retried from the safe state for their type, at
/// most [`MAX_REDISPATCH`] times. Any error leaves the record in FAILURE.
pub fn step<O: DfuObserver, R: Rng>(
    record: &mut SessionRecord,
    message: &Message,
    ctx: &mut HandlerContext<'_, O, R>,
) -> Result<Transition, StepError> {
    ctx.emit(DfuEvent::MessageReceived {
        kind: message.kind(),
    });
    let result = redispatch(record.state, message.kind(), |state| {
        dispatch(state, record, message, ctx)
    });
    finish(record, result, ctx)
}

/// Apply the device's acknowledgement of the message we just sent.
pub fn on_ack<O: DfuObserver, R: Rng>(
    record: &mut SessionRecord,
    sent: MessageType,
    ack: Ack,
    ctx: &mut HandlerContext<'_, O, R>,
) -> Result<Transition, StepError> {
    ctx.emit(DfuEvent::AckReceived { ack });
    let state = record.state;
    let result = match ack.handle() {
        HANDLE_DATA_REQ | HANDLE_DATA_RSP => Err(StepError::UnexpectedAck { state, ack }),
        handle if handle != sent.handle() => Err(StepError::AckMismatch {
            expected: sent.handle(),
            actual: handle,
        }),
        HANDLE_FWID => handshake::on_fwid_ack(record, ack),
        HANDLE_READY => handshake::on_ready_ack(record, ack),
        HANDLE_START_DATA => transfer::on_transfer_ack(record, ack, ctx),
        _ => Err(StepError::UnexpectedAck { state, ack }),
    };
    finish(record, result, ctx)
}

fn redispatch(
    mut state: DfuState,
    kind: MessageType,
    mut dispatch: impl FnMut(DfuState) -> Result<Dispatch, StepError>,
) -> Result<Transition, StepError> {
    for _ in 0..=MAX_REDISPATCH {
        match dispatch(state)? {
            Dispatch::Done(transition) => return Ok(transition),
            Dispatch::Redispatch(safe) => {
                debug!(from = %state, to = %safe, kind = %kind, "Falling back to safe state");
                state = safe;
            }
        }
    }
    Err(StepError::RedispatchLimit {
        limit: MAX_REDISPATCH,
    })
}

fn dispatch<O: DfuObserver, R: Rng>(
    state: DfuState,
    record: &mut SessionRecord,
    message: &Message,
    ctx: &mut HandlerContext<'_, O, R>,
) -> Result<Dispatch, StepError> {
    match state {
        DfuState::WaitForStarted | DfuState::WaitForFwid => {
            handshake::on_wait_for_fwid(state, message, ctx)
        }
        DfuState::SentFwid | DfuState::WaitForReady => {
            handshake::on_wait_for_ready(state, record, message, ctx)
        }
        DfuState::SentReady | DfuState::SentStart => control::fall_back(message),
        DfuState::SentData => control::on_confirmation(state, record, message, ctx),
        DfuState::Success | DfuState::Failure => Err(StepError::Terminated(state)),
    }
}

fn finish<O: DfuObserver, R: Rng>(
    record: &mut SessionRecord,
    result: Result<Transition, StepError>,
    ctx: &HandlerContext<'_, O, R>,
) -> Result<Transition, StepError> {
    let from = record.state;
    let next = match &result {
        Ok(transition) => transition.next,
        Err(e) => {
            ctx.emit(DfuEvent::Error {
                message: e.to_string(),
            });
            DfuState::Failure
        }
    };
    record.goto_state(next);
    if from != next {
        ctx.emit(DfuEvent::StateChanged { from, to: next });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::Field;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Fixture {
        identity: LocalIdentity,
        transfer: TransferParams,
        firmware: FirmwareImage,
        rng: StdRng,
    }

    impl Fixture {
        fn new(firmware_len: usize) -> Self {
            Self {
                identity: LocalIdentity::default(),
                transfer: TransferParams::default(),
                firmware: FirmwareImage::from_bytes((0..firmware_len).map(|i| i as u8).collect())
                    .unwrap(),
                rng: StdRng::seed_from_u64(7),
            }
        }

        fn ctx(&mut self) -> HandlerContext<'_, NullObserver, StdRng> {
            HandlerContext {
                identity: &self.identity,
                transfer: &self.transfer,
                firmware: &self.firmware,
                observer: &NullObserver,
                rng: &mut self.rng,
            }
        }

        fn record(&self, state: DfuState) -> SessionRecord {
            let mut record = SessionRecord::new(self.firmware.segment_count());
            record.state = state;
            record
        }
    }

    fn device_fwid(app_version: u32) -> Message {
        Message::new(MessageType::Fwid)
            .with(Field::Handle, HANDLE_FWID)
            .with(Field::SdVersion, 0x64u16)
            .with(Field::BlType, 1u8)
            .with(Field::BlVersion, 1u8)
            .with(Field::CompanyId, 0x59u32)
            .with(Field::AppId, 0xBEEFu16)
            .with(Field::AppVersion, app_version)
    }

    fn device_ready(transaction_id: u32) -> Message {
        Message::new(MessageType::ReadyApp)
            .with(Field::Handle, HANDLE_READY)
            .with(Field::Type, 0u8)
            .with(Field::Authority, 1u8)
            .with(Field::TransactionId, transaction_id)
            .with(Field::CompanyId, 0x59u32)
            .with(Field::AppId, 0xBEEFu16)
            .with(Field::AppVersion, 1u32)
    }

    #[test]
    fn test_fwid_reply_from_initial_state() {
        let mut fx = Fixture::new(32);
        let mut record = fx.record(DfuState::WaitForStarted);

        let t = step(&mut record, &device_fwid(1), &mut fx.ctx()).unwrap();
        assert_eq!(t.next, DfuState::SentFwid);
        assert_eq!(record.state, DfuState::SentFwid);

        let reply = t.outgoing.unwrap();
        assert_eq!(reply.kind(), MessageType::Fwid);
        assert_eq!(reply.int(Field::SdVersion), Some(0x64));
        assert_eq!(reply.int(Field::BlType), Some(1));
        assert_eq!(reply.int(Field::BlVersion), Some(1));
        assert_eq!(reply.int(Field::CompanyId), Some(0x59));
        assert_eq!(reply.int(Field::AppId), Some(0xBEEF));
        assert_eq!(reply.int(Field::AppVersion), Some(2));
        assert!(reply.encode().unwrap().warnings.is_empty());
    }

    #[test]
    fn test_ready_handshake() {
        let mut fx = Fixture::new(32);
        let mut record = fx.record(DfuState::WaitForReady);

        let t = step(&mut record, &device_ready(0), &mut fx.ctx()).unwrap();
        assert_eq!(t.next, DfuState::SentReady);

        let tid = record.transaction_id.expect("transaction id generated");
        assert!(tid < TRANSACTION_ID_LIMIT);

        let request = t.outgoing.unwrap();
        assert_eq!(request.kind(), MessageType::ReadyApp);
        assert_eq!(request.int(Field::Authority), Some(7));
        assert_eq!(request.int(Field::TransactionId), Some(tid as u64));
        assert_eq!(request.int(Field::AppVersion), Some(2));
        assert!(request.encode().unwrap().warnings.is_empty());
    }

    #[test]
    fn test_ready_ack_sends_start() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::WaitForReady);
        record.transaction_id = Some(1234);

        let t = step(&mut record, &device_ready(7), &mut fx.ctx()).unwrap();
        assert_eq!(t.next, DfuState::SentStart);

        let start = t.outgoing.unwrap();
        assert_eq!(start.kind(), MessageType::StartDfu);
        assert_eq!(start.int(Field::Reserved), Some(0));
        assert_eq!(start.int(Field::TransactionId), Some(1234));
        assert_eq!(start.int(Field::StartAddr), Some(0x18000));
        assert_eq!(start.int(Field::Length), Some(10));
        assert_eq!(start.int(Field::SignLength), Some(0));
        assert_eq!(start.int(Field::Flags), Some(0));
    }

    #[test]
    fn test_ready_ack_without_transaction_starts_with_zero() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::SentFwid);

        let t = step(&mut record, &device_ready(7), &mut fx.ctx()).unwrap();
        assert_eq!(t.next, DfuState::SentStart);
        assert_eq!(record.state, DfuState::SentStart);
        assert_eq!(record.transaction_id, Some(0));
        let start = t.outgoing.unwrap();
        assert_eq!(start.kind(), MessageType::StartDfu);
        assert_eq!(start.int(Field::TransactionId), Some(0));

        let t = on_ack(
            &mut record,
            MessageType::StartDfu,
            Ack::from_handle(HANDLE_START_DATA),
            &mut fx.ctx(),
        )
        .unwrap();
        assert_eq!(t.outgoing.unwrap().int(Field::TransactionId), Some(0));
    }

    #[test]
    fn test_redispatch_is_bounded() {
        let mut calls = 0;
        let err = redispatch(DfuState::SentStart, MessageType::ReadyApp, |_| {
            calls += 1;
            Ok(Dispatch::Redispatch(DfuState::SentStart))
        })
        .unwrap_err();
        assert_eq!(
            err,
            StepError::RedispatchLimit {
                limit: MAX_REDISPATCH
            }
        );
        assert_eq!(calls, MAX_REDISPATCH + 1);
    }

    #[test]
    fn test_safe_state_fallback_from_sent_start() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::SentStart);

        let t = step(&mut record, &device_ready(0), &mut fx.ctx()).unwrap();
        assert_eq!(t.next, DfuState::SentReady);
        assert_eq!(t.outgoing.unwrap().kind(), MessageType::ReadyApp);
    }

    #[test]
    fn test_fwid_in_wait_for_ready_falls_back() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::WaitForReady);

        let t = step(&mut record, &device_fwid(1), &mut fx.ctx()).unwrap();
        assert_eq!(t.next, DfuState::SentFwid);
        assert_eq!(t.outgoing.unwrap().kind(), MessageType::Fwid);
    }

    #[test]
    fn test_no_safe_state_is_failure() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::SentReady);
        let data = Message::new(MessageType::DfuData)
            .with(Field::Segment, 1u16)
            .with(Field::TransactionId, 1u32)
            .with(Field::DataSegment, vec![0u8; 16]);

        let err = step(&mut record, &data, &mut fx.ctx()).unwrap_err();
        assert_eq!(
            err,
            StepError::NoSafeState {
                kind: MessageType::DfuData
            }
        );
        assert_eq!(record.state, DfuState::Failure);
    }

    #[test]
    fn test_ready_in_wait_for_fwid_is_failure() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::WaitForFwid);

        let err = step(&mut record, &device_ready(0), &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, StepError::UnexpectedTransition { .. }));
        assert_eq!(record.state, DfuState::Failure);
    }

    #[test]
    fn test_unexpected_ready_transaction_is_failure() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::WaitForReady);

        let err = step(&mut record, &device_ready(3), &mut fx.ctx()).unwrap_err();
        assert_eq!(
            err,
            StepError::UnexpectedTransition {
                state: DfuState::WaitForReady,
                kind: MessageType::ReadyApp
            }
        );
    }

    #[test]
    fn test_transfer_completion() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::SentData);

        let t = step(&mut record, &device_fwid(2), &mut fx.ctx()).unwrap();
        assert_eq!(t.next, DfuState::Success);
        assert!(t.outgoing.is_none());
        assert!(record.state.is_terminal());
    }

    #[test]
    fn test_old_version_restarts_handshake() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::SentData);
        record.transaction_id = Some(55);
        record.cursor.advance();

        let t = step(&mut record, &device_fwid(1), &mut fx.ctx()).unwrap();
        assert_eq!(t.next, DfuState::SentFwid);
        assert_eq!(t.outgoing.unwrap().kind(), MessageType::Fwid);
        assert_eq!(record.transaction_id, None);
        assert_eq!(record.cursor.next, 1);
    }

    #[test]
    fn test_unexpected_version_after_transfer_is_failure() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::SentData);

        assert!(step(&mut record, &device_fwid(9), &mut fx.ctx()).is_err());
        assert_eq!(record.state, DfuState::Failure);
    }

    #[test]
    fn test_terminal_states_reject_input() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::Success);

        let err = step(&mut record, &device_fwid(2), &mut fx.ctx()).unwrap_err();
        assert_eq!(err, StepError::Terminated(DfuState::Success));
    }

    #[test]
    fn test_fwid_ack_moves_to_wait_for_ready() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::SentFwid);

        let t = on_ack(
            &mut record,
            MessageType::Fwid,
            Ack::from_handle(HANDLE_FWID),
            &mut fx.ctx(),
        )
        .unwrap();
        assert_eq!(t, Transition::to(DfuState::WaitForReady));
    }

    #[test]
    fn test_ready_ack_keeps_waiting() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::SentReady);

        let t = on_ack(
            &mut record,
            MessageType::ReadyApp,
            Ack::from_handle(HANDLE_READY),
            &mut fx.ctx(),
        )
        .unwrap();
        assert_eq!(t, Transition::to(DfuState::SentReady));
    }

    #[test]
    fn test_transfer_acks_stream_segments() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::SentStart);
        record.transaction_id = Some(77);
        let ack = Ack::from_handle(HANDLE_START_DATA);

        let mut segments = Vec::new();
        let mut sent = MessageType::StartDfu;
        loop {
            let t = on_ack(&mut record, sent, ack, &mut fx.ctx()).unwrap();
            assert_eq!(t.next, DfuState::SentData);
            match t.outgoing {
                Some(data) => {
                    assert_eq!(data.kind(), MessageType::DfuData);
                    assert_eq!(data.int(Field::TransactionId), Some(77));
                    segments.push(data.int(Field::Segment).unwrap());
                    sent = MessageType::DfuData;
                }
                None => break,
            }
        }
        assert_eq!(segments, vec![1, 2, 3]);
        assert_eq!(record.cursor.next, 4);

        // drained cursor stays put
        let t = on_ack(&mut record, sent, ack, &mut fx.ctx()).unwrap();
        assert!(t.outgoing.is_none());
        assert_eq!(record.cursor.next, 4);
    }

    #[test]
    fn test_segment_payload_in_data_message() {
        let mut fx = Fixture::new(40);
        let mut record = fx.record(DfuState::SentStart);
        record.transaction_id = Some(1);

        let t = on_ack(
            &mut record,
            MessageType::StartDfu,
            Ack::from_handle(HANDLE_START_DATA),
            &mut fx.ctx(),
        )
        .unwrap();
        let data = t.outgoing.unwrap();
        let expected: Vec<u8> = (0u8..16).rev().collect();
        assert_eq!(
            data.get(Field::DataSegment).and_then(|v| v.as_raw()),
            Some(expected.as_slice())
        );
        assert_eq!(data.encode().unwrap().bytes.len(), 24);
    }

    #[test]
    fn test_ack_mismatch_and_unexpected() {
        let mut fx = Fixture::new(40);

        let mut record = fx.record(DfuState::SentFwid);
        let err = on_ack(
            &mut record,
            MessageType::Fwid,
            Ack::from_handle(HANDLE_READY),
            &mut fx.ctx(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            StepError::AckMismatch {
                expected: HANDLE_FWID,
                actual: HANDLE_READY
            }
        );
        assert_eq!(record.state, DfuState::Failure);

        let mut record = fx.record(DfuState::SentData);
        let err = on_ack(
            &mut record,
            MessageType::DfuData,
            Ack::from_handle(HANDLE_DATA_REQ),
            &mut fx.ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, StepError::UnexpectedAck { .. }));
    }
}
