//! Completion, restart and safe-state fallback.

use rand::Rng;
use tracing::info;

use super::{Dispatch, HandlerContext, StepError, Transition};
use crate::events::{DfuEvent, DfuObserver, LogLevel};
use crate::protocol::{Field, Message, MessageType};
use crate::state::machine::{DfuState, SessionRecord};

/// Retry an unexpected message from the state that normally expects it.
pub(super) fn fall_back(message: &Message) -> Result<Dispatch, StepError> {
    DfuState::safe_state_for(message.kind())
        .map(Dispatch::Redispatch)
        .ok_or(StepError::NoSafeState {
            kind: message.kind(),
        })
}

/// SENT_DATA: the device reports its firmware after the transfer.
pub(super) fn on_confirmation<O: DfuObserver, R: Rng>(
    state: DfuState,
    record: &mut SessionRecord,
    message: &Message,
    ctx: &mut HandlerContext<'_, O, R>,
) -> Result<Dispatch, StepError> {
    let unexpected = StepError::UnexpectedTransition {
        state,
        kind: message.kind(),
    };
    if message.kind() != MessageType::Fwid {
        return Err(unexpected);
    }

    let reported = message.int(Field::AppVersion);
    let target = u64::from(ctx.identity.app_version);

    if reported == Some(target) {
        info!(app_version = target, "Device confirmed new firmware");
        ctx.log(LogLevel::Info, "Firmware update successful");
        ctx.emit(DfuEvent::Complete);
        return Ok(Dispatch::Done(Transition::to(DfuState::Success)));
    }

    if reported.is_some() && reported == target.checked_sub(1) {
        tracing::warn!(
            app_version = reported.unwrap_or_default(),
            "Device still reports previous version, restarting handshake"
        );
        ctx.log(LogLevel::Warn, "Transfer not applied, restarting");
        record.restart();
        return Ok(Dispatch::Redispatch(DfuState::WaitForFwid));
    }

    Err(unexpected)
}
