// src/sync/mod.rs

//! Concurrency primitives for the scheduler.
//!
//! - [`Semaphore`] bounds how many tasks may execute user work at once,
//!   with FIFO waiters and scoped acquisition.
//! - [`PauseGate`] is the latch that suspends task attempts while the
//!   workflow is paused.

pub mod pause;
pub mod semaphore;

pub use pause::PauseGate;
pub use semaphore::{Permit, Semaphore};
