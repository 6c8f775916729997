// src/process/mod.rs

//! Child process layer.
//!
//! This module owns the OS-level process for a task, using
//! `tokio::process::Command`:
//!
//! - [`handle`] launches the child, supervises it in a background Tokio task
//!   and fires the task's data-available / terminated events.
//! - [`stream`] holds the buffered stdout / stderr byte streams readers drain.

pub mod handle;
pub mod stream;

pub(crate) use handle::{ProcessEvents, ProcessHandle};
pub use handle::{CommandSpec, ProcessState};
pub use stream::{Available, OutputStream};
