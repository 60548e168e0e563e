//! START_DFU and segmented DFU_DATA.

use rand::Rng;

use super::{HandlerContext, StepError, Transition};
use crate::events::{DfuEvent, DfuObserver, LogLevel};
use crate::protocol::{Ack, Field, Message, MessageType};
use crate::state::machine::{DfuState, SessionRecord};

pub(super) fn start_request<O: DfuObserver, R: Rng>(
    ctx: &HandlerContext<'_, O, R>,
    tid: u32,
) -> Message {
    ctx.log(
        LogLevel::Info,
        format!(
            "Starting transfer of {} bytes ({} segments) at 0x{:X}",
            ctx.firmware.len(),
            ctx.firmware.segment_count(),
            ctx.transfer.start_address
        ),
    );
    Message::new(MessageType::StartDfu)
        .with(Field::Reserved, 0u8)
        .with(Field::TransactionId, tid)
        .with(Field::StartAddr, ctx.transfer.start_address)
        .with(Field::Length, ctx.firmware.length_words())
        .with(Field::SignLength, 0u16)
        .with(Field::Flags, ctx.transfer.flags)
}

/// START or DATA acknowledged: send the next segment, if any remain.
pub(super) fn on_transfer_ack<O: DfuObserver, R: Rng>(
    record: &mut SessionRecord,
    ack: Ack,
    ctx: &HandlerContext<'_, O, R>,
) -> Result<Transition, StepError> {
    if !record.state.is_transfer() {
        return Err(StepError::UnexpectedAck {
            state: record.state,
            ack,
        });
    }
    let tid = record.transaction_id.ok_or(StepError::NoTransaction)?;

    let Some(segment) = record.cursor.advance() else {
        tracing::debug!("All segments sent, waiting for device confirmation");
        return Ok(Transition::to(DfuState::SentData));
    };
    let payload =
        ctx.firmware
            .segment_payload(segment)
            .ok_or(StepError::SegmentOutOfRange {
                segment,
                total: ctx.firmware.segment_count(),
            })?;

    ctx.emit(DfuEvent::Progress {
        current: record.cursor.sent() as u64,
        total: record.cursor.total as u64,
    });

    let data = Message::new(MessageType::DfuData)
        .with(Field::Segment, segment as u64)
        .with(Field::TransactionId, tid)
        .with(Field::DataSegment, payload.to_vec());
    Ok(Transition::send(DfuState::SentData, data))
}
