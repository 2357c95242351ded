// src/signal/mod.rs

//! In-process pub/sub for lifecycle events.
//!
//! - [`Signaller`] is a multi-event emitter constructed with a closed set of
//!   legal event names; it supports wildcard receivers, one-shot
//!   subscriptions, and token-based auto-unsubscribe.
//! - [`EventStream`] is the pull-based side: an order-preserving buffer of
//!   payloads that ends only when cancelled.

pub mod signaller;
pub mod stream;

pub use signaller::{Handler, Signaller, SubscriberId, WILDCARD};
pub use stream::EventStream;
