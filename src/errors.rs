// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Programmer-facing misuse (duplicate ids, cycles, unknown events or ids,
//! invalid transitions) surfaces synchronously from the call that caused it.
//! Task-runtime failures (cancellation, timeouts, user errors) are captured
//! on the task, settle its future, and only escape through fail-fast
//! iteration.

use std::sync::Arc;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A vertex or task with this id is already registered.
    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    /// Adding this edge would make the graph cyclic (self-loops included).
    #[error("edge '{from}' -> '{to}' would create a cycle")]
    CycleDetected { from: String, to: String },

    /// An event name outside the signaller's declared set.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    /// An operation named a vertex or task that is not registered.
    #[error("unknown id '{0}'")]
    UnknownId(String),

    /// The requested transition is not legal from the current state.
    #[error("transition '{transition}' is not valid from state '{from}'")]
    InvalidTransition {
        from: &'static str,
        transition: &'static str,
    },

    /// The task was removed between scheduling and start.
    #[error("task '{0}' was removed before execution")]
    RemovedBeforeExecution(String),

    /// A single attempt exceeded the task's wall-clock budget.
    #[error("task timed out after {0} ms")]
    TimedOut(u64),

    /// The task was cancelled while still pending.
    #[error("task was cancelled")]
    Cancelled,

    /// Opaque failure raised by user-supplied work.
    #[error("{0}")]
    User(Arc<anyhow::Error>),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::User(Arc::new(err))
    }
}
