// src/lib.rs

//! Fluent child-process tasks.
//!
//! A [`Task`] describes one command (executable, arguments, working
//! directory), launches it at most once, waits for it at most once, and
//! hands its output back either all at once ([`Task::output`]) or in chunks
//! as it arrives ([`Task::output_with`]).
//!
//! ```no_run
//! # async fn demo() -> doer::errors::Result<()> {
//! use doer::exec::Background;
//!
//! let build = doer::task("cargo", ["build"]).at("/tmp/project");
//! build
//!     .output_with(|chunk| eprint!("{}", String::from_utf8_lossy(chunk)))
//!     .run_on(&Background, true)
//!     .await;
//! // ... later, if it is taking too long:
//! build.end();
//! # Ok(())
//! # }
//! ```
//!
//! Module map:
//! - [`task`]: the task type, its run controller and output streaming.
//! - [`process`]: the supervised child process and its byte streams.
//! - [`events`]: per-task event sources and the subscription registry.
//! - [`exec`]: execution contexts for deferred launches.
//! - [`config`], [`logging`], [`errors`]: ambient plumbing.

pub mod config;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod process;
pub mod task;

mod sync;

pub use config::DoerConfig;
pub use errors::{DoerError, Result};
pub use process::ProcessState;
pub use task::{Lifecycle, Task, task};
