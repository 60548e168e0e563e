//! FWID and READY exchanges.

use rand::Rng;

use super::{Dispatch, HandlerContext, StepError, Transition, control, transfer};
use crate::events::{DfuObserver, LogLevel};
use crate::protocol::constants::*;
use crate::protocol::{Ack, Field, Message, MessageType};
use crate::session::LocalIdentity;
use crate::state::machine::{DfuState, SessionRecord};

/// WAIT_FOR_STARTED / WAIT_FOR_FWID: answer the device's FWID with ours.
pub(super) fn on_wait_for_fwid<O: DfuObserver, R: Rng>(
    state: DfuState,
    message: &Message,
    ctx: &mut HandlerContext<'_, O, R>,
) -> Result<Dispatch, StepError> {
    if message.kind() != MessageType::Fwid {
        return Err(StepError::UnexpectedTransition {
            state,
            kind: message.kind(),
        });
    }
    ctx.log(
        LogLevel::Info,
        format!(
            "Device firmware: app 0x{:04X} v{}",
            message.int(Field::AppId).unwrap_or_default(),
            message.int(Field::AppVersion).unwrap_or_default()
        ),
    );
    Ok(Dispatch::Done(Transition::send(
        DfuState::SentFwid,
        fwid_reply(ctx.identity),
    )))
}

/// SENT_FWID / WAIT_FOR_READY: negotiate a transaction, then start it.
pub(super) fn on_wait_for_ready<O: DfuObserver, R: Rng>(
    state: DfuState,
    record: &mut SessionRecord,
    message: &Message,
    ctx: &mut HandlerContext<'_, O, R>,
) -> Result<Dispatch, StepError> {
    if message.kind() != MessageType::ReadyApp {
        return control::fall_back(message);
    }

    match message.int(Field::TransactionId) {
        Some(0) => {
            let tid = ctx.rng.gen_range(1..TRANSACTION_ID_LIMIT);
            record.transaction_id = Some(tid);
            tracing::debug!(transaction_id = tid, "Requesting transaction");
            Ok(Dispatch::Done(Transition::send(
                DfuState::SentReady,
                ready_request(ctx, tid),
            )))
        }
        Some(READY_ACK_TRANSACTION_ID) => {
            // A device may skip our READY request; the transfer then runs under id 0.
            let tid = *record.transaction_id.get_or_insert(0);
            Ok(Dispatch::Done(Transition::send(
                DfuState::SentStart,
                transfer::start_request(ctx, tid),
            )))
        }
        _ => Err(StepError::UnexpectedTransition {
            state,
            kind: message.kind(),
        }),
    }
}

/// Our FWID was acknowledged.
pub(super) fn on_fwid_ack(record: &SessionRecord, ack: Ack) -> Result<Transition, StepError> {
    match record.state {
        DfuState::SentFwid => Ok(Transition::to(DfuState::WaitForReady)),
        state => Err(StepError::UnexpectedAck { state, ack }),
    }
}

/// Our READY_APP was acknowledged. The device follows up with its own READY.
pub(super) fn on_ready_ack(record: &SessionRecord, ack: Ack) -> Result<Transition, StepError> {
    match record.state {
        DfuState::SentReady => Ok(Transition::to(DfuState::SentReady)),
        state => Err(StepError::UnexpectedAck { state, ack }),
    }
}

pub(super) fn fwid_reply(identity: &LocalIdentity) -> Message {
    Message::new(MessageType::Fwid)
        .with(Field::SdVersion, identity.sd_version)
        .with(Field::BlType, identity.bl_type)
        .with(Field::BlVersion, identity.bl_version)
        .with(Field::CompanyId, identity.company_id)
        .with(Field::AppId, identity.app_id)
        .with(Field::AppVersion, identity.app_version)
}

fn ready_request<O: DfuObserver, R: Rng>(ctx: &HandlerContext<'_, O, R>, tid: u32) -> Message {
    Message::new(MessageType::ReadyApp)
        .with(Field::Type, ctx.transfer.dfu_type)
        .with(Field::Authority, ctx.transfer.authority)
        .with(Field::CompanyId, ctx.identity.company_id)
        .with(Field::AppId, ctx.identity.app_id)
        .with(Field::AppVersion, ctx.identity.app_version)
        .with(Field::TransactionId, tid)
}
