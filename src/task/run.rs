// src/task/run.rs

//! Run controller: launch at most once, wait at most once.

use tracing::{debug, error, trace};

use crate::errors::Result;
use crate::exec::{ExecutionContext, Work};
use crate::process::{OutputStream, ProcessState};
use crate::sync::lock;
use crate::task::Task;

impl Task {
    /// Launch the child (first call only) and, if `wait`, suspend until it
    /// has exited.
    ///
    /// A failed spawn is returned here. The task still counts as launched
    /// afterwards, so later calls do not retry.
    pub async fn run(&self, wait: bool) -> Result<&Self> {
        self.execute(wait).await?;
        Ok(self)
    }

    /// Hand the launch (and optional wait) to `context` instead of doing it
    /// on the caller's future.
    ///
    /// Resolves as soon as the context has accepted the work. Errors from
    /// the deferred launch are logged and reflected in [`Task::state`].
    pub async fn run_on<C>(&self, context: &C, wait: bool) -> &Self
    where
        C: ExecutionContext + ?Sized,
    {
        let task = self.clone();
        let work: Work = Box::pin(async move {
            if let Err(e) = task.execute(wait).await {
                error!(task = task.id(), error = %e, "deferred task run failed");
            }
        });
        context.execute(work).await;
        self
    }

    /// Run to completion and return everything the child wrote to stdout,
    /// decoded as UTF-8.
    ///
    /// `Ok(None)` when the bytes are not valid UTF-8 or the child could not
    /// be started on an earlier call. Use [`Task::output_bytes`] to keep
    /// undecodable output.
    pub async fn output(&self) -> Result<Option<String>> {
        let bytes = self.output_bytes().await?;
        Ok(bytes.and_then(|b| decode(self.id(), "stdout", b)))
    }

    /// Like [`Task::output`], without decoding.
    pub async fn output_bytes(&self) -> Result<Option<Vec<u8>>> {
        let stream = self.shared.process.stdout();
        self.read_stream_to_end(stream).await
    }

    /// Run to completion and return everything the child wrote to stderr.
    pub async fn error_output(&self) -> Result<Option<String>> {
        let stream = self.shared.process.stderr();
        let bytes = self.read_stream_to_end(stream).await?;
        Ok(bytes.and_then(|b| decode(self.id(), "stderr", b)))
    }

    /// Drop every output subscription, then ask the child to terminate.
    ///
    /// Valid in any state: with nothing subscribed and nothing running it
    /// does nothing. Once it returns, no progress callback of this task
    /// starts again.
    pub fn end(&self) {
        let removed = self.shared.subscriptions.drain_all();
        let terminated = self.shared.process.terminate();
        debug!(task = self.id(), removed, terminated, "task ended");
    }

    async fn read_stream_to_end(&self, stream: &OutputStream) -> Result<Option<Vec<u8>>> {
        self.run(true).await?;
        if self.state() == ProcessState::SpawnFailed {
            return Ok(None);
        }
        Ok(Some(stream.read_to_end().await))
    }

    pub(crate) async fn execute(&self, wait: bool) -> Result<()> {
        self.launch_once()?;
        if wait {
            self.wait_once().await;
        }
        Ok(())
    }

    fn launch_once(&self) -> Result<()> {
        let mut lifecycle = lock(&self.shared.lifecycle);
        if !lifecycle.begin_launch() {
            trace!(task = self.id(), "already launched; skipping launch");
            return Ok(());
        }

        let setup = lock(&self.shared.setup).clone();
        self.shared
            .process
            .launch(&setup.command, &setup.config, self.shared.events.clone())
    }

    async fn wait_once(&self) {
        let should_wait = lock(&self.shared.lifecycle).begin_wait();
        if !should_wait {
            trace!(task = self.id(), "not launched or already waited; skipping wait");
            return;
        }

        let state = self.shared.process.await_exit().await;
        debug!(task = self.id(), ?state, "wait finished");
    }
}

fn decode(task: u64, stream: &'static str, bytes: Vec<u8>) -> Option<String> {
    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!(task, stream, error = %e.utf8_error(), "output is not valid UTF-8");
            None
        }
    }
}
