// src/events/mod.rs

//! Per-task event plumbing.
//!
//! Every task owns two [`EventSource`]s: one fired whenever new bytes are
//! available on its output stream, one fired once when its process has
//! terminated. Callers subscribe directly to those sources; there is no
//! process-wide notification bus.
//!
//! - [`source`] holds the observable and the [`Subscription`] handle.
//! - [`registry`] is the task's set of live subscriptions, used to tear
//!   everything down at once.

pub mod registry;
pub mod source;

pub use registry::SubscriptionRegistry;
pub use source::{EventKind, EventSource, Subscription};
