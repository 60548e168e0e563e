//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::{HandlerContext, StepError, Transition, on_ack, step};
pub use machine::{DfuState, SessionRecord};
