// src/process/handle.rs

//! Ownership of one OS child process and its output pipes.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::config::DoerConfig;
use crate::errors::{DoerError, Result};
use crate::events::EventSource;
use crate::process::stream::OutputStream;
use crate::sync::lock;

/// What to launch: executable, arguments, working directory, environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub launch_path: Option<PathBuf>,
    pub args: Vec<OsString>,
    pub directory: Option<PathBuf>,
    pub env: Vec<(OsString, OsString)>,
}

/// Observable state of a task's child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Not launched yet.
    Idle,
    Running { pid: Option<u32> },
    /// Exited and reaped. `None` if the exit status could not be collected.
    Exited(Option<ExitStatus>),
    /// A launch was attempted and failed; there is no child.
    SpawnFailed,
}

impl ProcessState {
    /// `true` once the process can no longer produce output.
    pub fn is_finished(&self) -> bool {
        matches!(self, ProcessState::Exited(_) | ProcessState::SpawnFailed)
    }
}

/// Event sources the supervisor fires for this process.
#[derive(Debug, Clone)]
pub(crate) struct ProcessEvents {
    pub data_available: EventSource,
    pub terminated: EventSource,
}

/// The child process plus its stdout and stderr streams.
///
/// `launch`, `await_exit` and `terminate` are each driven by the task's run
/// controller; nothing else in the crate calls them.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    task: u64,
    stdout: Arc<OutputStream>,
    stderr: Arc<OutputStream>,
    state: Arc<watch::Sender<ProcessState>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl ProcessHandle {
    pub fn new(task: u64) -> Self {
        let (state, _) = watch::channel(ProcessState::Idle);
        Self {
            task,
            stdout: Arc::new(OutputStream::new("stdout")),
            stderr: Arc::new(OutputStream::new("stderr")),
            state: Arc::new(state),
            kill_tx: Mutex::new(None),
        }
    }

    pub fn stdout(&self) -> &Arc<OutputStream> {
        &self.stdout
    }

    pub fn stderr(&self) -> &Arc<OutputStream> {
        &self.stderr
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Spawn the child and start supervising it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn launch(&self, spec: &CommandSpec, config: &DoerConfig, events: ProcessEvents) -> Result<()> {
        let Some(path) = spec.launch_path.as_ref() else {
            self.mark_spawn_failed();
            return Err(DoerError::MissingLaunchPath);
        };

        let mut cmd = Command::new(path);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if config.drain_stderr() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(config.kill_on_drop());

        if let Some(dir) = &spec.directory {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.mark_spawn_failed();
                return Err(DoerError::Spawn {
                    path: path.clone(),
                    source,
                });
            }
        };

        self.stdout.set_limit(config.max_buffered_bytes());
        self.stderr.set_limit(config.max_buffered_bytes());

        let pid = child.id();
        info!(
            task = self.task,
            pid,
            path = %path.display(),
            args = ?spec.args,
            "launched child process"
        );
        self.state.send_replace(ProcessState::Running { pid });

        match child.stderr.take() {
            Some(stderr) => spawn_stderr_pump(self.task, stderr, Arc::clone(&self.stderr)),
            None => self.stderr.close(),
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        *lock(&self.kill_tx) = Some(kill_tx);

        let stdout = child.stdout.take();
        let supervisor = Supervisor {
            task: self.task,
            child,
            stream: Arc::clone(&self.stdout),
            read_buffer_size: config.read_buffer_size(),
            exit_flush_timeout: config.exit_flush_timeout(),
            events,
            state: Arc::clone(&self.state),
        };
        tokio::spawn(supervisor.run(stdout, kill_rx));

        Ok(())
    }

    /// Wait until the child has exited and every termination handler ran.
    pub async fn await_exit(&self) -> ProcessState {
        let current = self.state();
        debug_assert!(
            current != ProcessState::Idle,
            "await_exit called before launch"
        );
        if current == ProcessState::Idle || current.is_finished() {
            return current;
        }

        let mut state_rx = self.state.subscribe();
        match state_rx.wait_for(ProcessState::is_finished).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Ask the supervisor to kill the child.
    ///
    /// Returns `false` when there is nothing to terminate: never launched,
    /// already asked, or already exited.
    pub fn terminate(&self) -> bool {
        let Some(kill_tx) = lock(&self.kill_tx).take() else {
            return false;
        };
        kill_tx.send(()).is_ok()
    }

    fn mark_spawn_failed(&self) {
        self.state.send_replace(ProcessState::SpawnFailed);
        self.stdout.close();
        self.stderr.close();
    }
}

/// Owns the `Child` for its whole life and is the single place events for
/// one task are fired from, so handling of two events never overlaps.
struct Supervisor {
    task: u64,
    child: Child,
    stream: Arc<OutputStream>,
    read_buffer_size: usize,
    exit_flush_timeout: Duration,
    events: ProcessEvents,
    state: Arc<watch::Sender<ProcessState>>,
}

impl Supervisor {
    async fn run(mut self, stdout: Option<ChildStdout>, mut kill_rx: oneshot::Receiver<()>) {
        let mut stdout = stdout;
        let mut buf = vec![0u8; self.read_buffer_size];
        let mut exited: Option<Option<ExitStatus>> = None;
        let mut flush_deadline: Option<Instant> = None;
        let mut kill_armed = true;

        if stdout.is_none() {
            self.close_stdout();
        }

        // Exit only once the child is reaped *and* stdout is closed.
        while exited.is_none() || stdout.is_some() {
            tokio::select! {
                // Polled in order: a kill request first, and pending output
                // always before the flush deadline.
                biased;

                cancel = &mut kill_rx, if kill_armed => {
                    kill_armed = false;
                    // A dropped sender means the task went away, not a request.
                    if cancel.is_ok() {
                        info!(task = self.task, "termination requested; killing child process");
                        if let Err(e) = self.child.start_kill() {
                            debug!(task = self.task, error = %e, "kill failed; child already exited");
                        }
                    }
                }

                read = read_chunk(&mut stdout, &mut buf), if stdout.is_some() => {
                    match read {
                        Ok(0) => {
                            stdout = None;
                            self.close_stdout();
                        }
                        Ok(n) => {
                            trace!(task = self.task, bytes = n, "stdout chunk");
                            self.stream.push(&buf[..n]);
                            self.events.data_available.emit();
                            // Idle timeout: measured from when the handlers
                            // returned, not from when the child exited.
                            if exited.is_some() {
                                flush_deadline = Some(Instant::now() + self.exit_flush_timeout);
                            }
                        }
                        Err(e) => {
                            warn!(task = self.task, error = %e, "reading child stdout failed; closing stream");
                            stdout = None;
                            self.close_stdout();
                        }
                    }
                }

                status_res = self.child.wait(), if exited.is_none() => {
                    let status = match status_res {
                        Ok(status) => Some(status),
                        Err(e) => {
                            warn!(task = self.task, error = %e, "waiting for child process failed");
                            None
                        }
                    };
                    info!(
                        task = self.task,
                        exit_code = ?status.and_then(|s| s.code()),
                        success = status.is_some_and(|s| s.success()),
                        "child process exited"
                    );
                    exited = Some(status);
                    flush_deadline = Some(Instant::now() + self.exit_flush_timeout);
                }

                _ = sleep_until(flush_deadline.unwrap_or_else(Instant::now)),
                    if flush_deadline.is_some() && stdout.is_some() =>
                {
                    debug!(
                        task = self.task,
                        "stdout idle after exit for the flush timeout; closing stream"
                    );
                    stdout = None;
                    self.close_stdout();
                }
            }
        }

        self.events.terminated.emit_final();
        self.state
            .send_replace(ProcessState::Exited(exited.flatten()));
        debug!(task = self.task, "supervisor finished");
    }

    /// Close the stream and announce it, so a drain can observe end-of-stream.
    fn close_stdout(&self) {
        self.stream.close();
        self.events.data_available.emit();
    }
}

async fn read_chunk(stdout: &mut Option<ChildStdout>, buf: &mut [u8]) -> io::Result<usize> {
    match stdout {
        Some(out) => out.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Always consume stderr so the child never blocks on a full pipe.
fn spawn_stderr_pump(task: u64, mut stderr: ChildStderr, stream: Arc<OutputStream>) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            match stderr.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    trace!(task, "stderr: {}", String::from_utf8_lossy(&buf[..n]).trim_end());
                    stream.push(&buf[..n]);
                }
                Err(e) => {
                    debug!(task, error = %e, "reading child stderr failed");
                    break;
                }
            }
        }
        stream.close();
    });
}
