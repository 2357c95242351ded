// src/fsm/mod.rs

//! Declarative finite state machines.
//!
//! States and transitions are plain enums implementing [`Named`]; a machine
//! is built from a static dispatch table mapping each transition to its
//! legal source states and destination. Every `invoke` emits four events
//! (`{transition}.before`, `{from}.leave`, `{to}.enter`,
//! `{transition}.after`) carrying one shared [`Context`] value.

pub mod machine;

pub use machine::{
    after, before, enter, event_names, leave, Context, FromStates, MachineDef, Named,
    StateMachine, TransitionDef,
};
