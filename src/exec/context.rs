// src/exec/context.rs

//! Pluggable "where does the launch run" abstraction.
//!
//! [`crate::Task::run_on`] does not launch or wait itself; it packages that
//! work as a [`Work`] future and hands it to an [`ExecutionContext`].
//!
//! - [`Inline`] runs the work before `run_on` returns.
//! - [`Background`] spawns it on the current Tokio runtime.
//! - A [`tokio::runtime::Handle`] spawns it on that runtime.
//! - [`from_fn`] adapts any closure, so callers can plug in their own queue.

use std::fmt;
use std::future::{self, Future};
use std::pin::Pin;

/// A zero-argument unit of work.
pub type Work = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Strategy for running a unit of work.
pub trait ExecutionContext: Send + Sync {
    /// Accept `work` for execution.
    ///
    /// The returned future resolves once the context has taken the work. An
    /// inline context resolves only after the work has finished; a
    /// background context resolves immediately.
    fn execute(&self, work: Work) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Run the work right away, as part of the caller's own future.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl ExecutionContext for Inline {
    fn execute(&self, work: Work) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        work
    }
}

/// Spawn the work onto the ambient Tokio runtime and return immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct Background;

impl ExecutionContext for Background {
    fn execute(&self, work: Work) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        tokio::spawn(work);
        Box::pin(future::ready(()))
    }
}

impl ExecutionContext for tokio::runtime::Handle {
    fn execute(&self, work: Work) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.spawn(work);
        Box::pin(future::ready(()))
    }
}

/// A caller-supplied context built from a closure. See [`from_fn`].
pub struct FromFn<F>(F);

/// Wrap `f` so it can be used as an [`ExecutionContext`].
///
/// `f` must arrange for the work to be polled to completion eventually,
/// e.g. by pushing it onto a queue drained by another task.
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: Fn(Work) + Send + Sync,
{
    FromFn(f)
}

impl<F> ExecutionContext for FromFn<F>
where
    F: Fn(Work) + Send + Sync,
{
    fn execute(&self, work: Work) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        (self.0)(work);
        Box::pin(future::ready(()))
    }
}

impl<F> fmt::Debug for FromFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FromFn(..)")
    }
}
