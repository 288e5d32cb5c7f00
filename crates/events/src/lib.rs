//! Status-event bus for the batch execution engine.
//!
//! The engine's only output besides changeset specs is a stream of
//! [`StatusEvent`]s reporting task state transitions. This crate owns the
//! event type and a broadcast bus; rendering that stream (terminal progress
//! bars, JSON logs) is a concern of the caller.

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventReceiver, EventSender, SendError};
pub use event::{StatusEvent, TaskId, TaskState};
