// src/task/mod.rs

//! The [`Task`]: one configured, launch-at-most-once child process.
//!
//! - this module: construction and fluent configuration.
//! - [`lifecycle`]: the launch/wait state machine.
//! - [`run`]: launching (inline or through an execution context), waiting,
//!   full-output reads and `end()`.
//! - [`streaming`]: incremental output delivery to a progress callback.

pub mod lifecycle;
pub mod run;
pub mod streaming;

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::config::DoerConfig;
use crate::events::{EventKind, EventSource, SubscriptionRegistry};
use crate::process::{CommandSpec, ProcessEvents, ProcessHandle, ProcessState};
use crate::sync::lock;

pub use lifecycle::Lifecycle;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Create a task for `launch_path` with `args`. Nothing runs until
/// [`Task::run`] (or something that implies it) is called.
///
/// ```no_run
/// # async fn demo() -> doer::errors::Result<()> {
/// let hello = doer::task("echo", ["Hello World"]).output().await?;
/// assert_eq!(hello.as_deref().map(str::trim), Some("Hello World"));
/// # Ok(())
/// # }
/// ```
pub fn task<P, I, S>(launch_path: P, args: I) -> Task
where
    P: Into<PathBuf>,
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    Task::new().launch_path(launch_path).args(args)
}

/// Handle to a task. Clones share the same process, streams and
/// subscriptions.
#[derive(Clone)]
pub struct Task {
    shared: Arc<Shared>,
}

struct Shared {
    id: u64,
    setup: Mutex<Setup>,
    lifecycle: Mutex<Lifecycle>,
    process: ProcessHandle,
    events: ProcessEvents,
    subscriptions: Arc<SubscriptionRegistry>,
}

#[derive(Debug, Clone, Default)]
struct Setup {
    command: CommandSpec,
    config: DoerConfig,
}

impl Task {
    /// An unconfigured task with no launch path.
    pub fn new() -> Self {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::new(Shared {
                id,
                setup: Mutex::new(Setup::default()),
                lifecycle: Mutex::new(Lifecycle::default()),
                process: ProcessHandle::new(id),
                events: ProcessEvents {
                    data_available: EventSource::new(EventKind::DataAvailable),
                    terminated: EventSource::new(EventKind::Terminated),
                },
                subscriptions: Arc::new(SubscriptionRegistry::new()),
            }),
        }
    }

    pub fn launch_path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.configure("launch path", |setup| setup.command.launch_path = Some(path))
    }

    pub fn arg(self, arg: impl Into<OsString>) -> Self {
        let arg = arg.into();
        self.configure("arguments", |setup| setup.command.args.push(arg))
    }

    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        self.configure("arguments", |setup| setup.command.args.extend(args))
    }

    /// Run the child in `directory`.
    pub fn at(self, directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        self.configure("working directory", |setup| {
            setup.command.directory = Some(directory)
        })
    }

    pub fn env(self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        let pair = (key.into(), value.into());
        self.configure("environment", |setup| setup.command.env.push(pair))
    }

    pub fn with_config(self, config: DoerConfig) -> Self {
        self.configure("configuration", |setup| setup.config = config)
    }

    /// Apply a configuration change unless the task was already launched.
    fn configure(self, what: &str, apply: impl FnOnce(&mut Setup)) -> Self {
        // Held across the update so a concurrent launch sees all or nothing.
        let lifecycle = lock(&self.shared.lifecycle);
        if lifecycle.is_launched() {
            warn!(task = self.shared.id, what, "task already launched; configuration change ignored");
        } else {
            apply(&mut lock(&self.shared.setup));
        }
        drop(lifecycle);
        self
    }

    /// Process-unique identifier, used in log records.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn command(&self) -> CommandSpec {
        lock(&self.shared.setup).command.clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *lock(&self.shared.lifecycle)
    }

    pub fn is_launched(&self) -> bool {
        self.lifecycle().is_launched()
    }

    pub fn is_waited(&self) -> bool {
        self.lifecycle().is_waited()
    }

    pub fn state(&self) -> ProcessState {
        self.shared.process.state()
    }

    pub fn pid(&self) -> Option<u32> {
        match self.state() {
            ProcessState::Running { pid } => pid,
            _ => None,
        }
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.state() {
            ProcessState::Exited(status) => status,
            _ => None,
        }
    }

    /// Number of live output subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.len()
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.shared.id)
            .field("command", &lock(&self.shared.setup).command)
            .field("lifecycle", &self.lifecycle())
            .field("state", &self.state())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
