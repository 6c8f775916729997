// src/exec/mod.rs

//! Execution contexts for deferred launches.
//!
//! - [`context`] provides the [`ExecutionContext`] trait plus the built-in
//!   [`Inline`] and [`Background`] strategies.

pub mod context;

pub use context::{Background, ExecutionContext, FromFn, Inline, Work, from_fn};
