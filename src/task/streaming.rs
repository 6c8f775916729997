// src/task/streaming.rs

//! Incremental output delivery.
//!
//! Two independent events feed one progress callback:
//!
//! - every data-available event drains the buffered stdout bytes into the
//!   callback; once a drain finds the stream exhausted, that subscription
//!   removes itself.
//! - the terminated event (at most once) drains one final time and then
//!   removes *every* subscription of the task, so nothing outlives the
//!   process.
//!
//! Zero-length chunks never reach the callback. Attaching after the process
//! has terminated registers nothing.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::process::{Available, OutputStream};
use crate::sync::lock;
use crate::task::Task;

type Progress = Box<dyn FnMut(&[u8]) + Send>;

/// Shared by the two subscriptions one `output_with` call creates.
struct Drain {
    stream: Arc<OutputStream>,
    progress: Mutex<Progress>,
}

impl Drain {
    /// Deliver whatever is buffered. Returns `true` once the stream is
    /// exhausted and nothing more will arrive.
    fn step(&self) -> bool {
        match self.stream.available() {
            Available::Data(bytes) => {
                let mut progress = lock(&self.progress);
                (&mut **progress)(&bytes);
                false
            }
            Available::Empty => false,
            Available::Closed => true,
        }
    }
}

impl Task {
    /// Deliver stdout to `progress` in chunks as it arrives.
    ///
    /// Attach before [`Task::run`]; bytes read before this call are delivered
    /// with the next chunk. The callback runs on the runtime thread that
    /// supervises the child and should return quickly. If several callbacks
    /// are attached they share one stream: each chunk goes to whichever drains
    /// first.
    pub fn output_with<F>(&self, progress: F) -> &Self
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let drain = Arc::new(Drain {
            stream: Arc::clone(self.shared.process.stdout()),
            progress: Mutex::new(Box::new(progress)),
        });
        let registry = &self.shared.subscriptions;

        let on_data = {
            let drain = Arc::clone(&drain);
            let registry = Arc::downgrade(registry);
            self.shared.events.data_available.subscribe(move |me| {
                if !drain.step() {
                    return;
                }
                match registry.upgrade() {
                    Some(registry) => registry.remove_one(me),
                    None => {
                        me.cancel();
                    }
                }
            })
        };
        registry.add(on_data.clone());

        let on_exit = {
            let registry = Arc::downgrade(registry);
            self.shared.events.terminated.subscribe(move |me| {
                let _ = drain.step();
                // Cancelled before the sweep, so a concurrent `add` of this
                // subscription is either swept or refused.
                me.cancel();
                if let Some(registry) = registry.upgrade() {
                    registry.drain_all();
                }
            })
        };

        if !registry.add(on_exit) {
            // Terminated already fired: nothing would ever remove `on_data`.
            registry.remove_one(&on_data);
            warn!(task = self.id(), "process already terminated; progress callback not attached");
            return self;
        }

        debug!(task = self.id(), "stdout streaming attached");
        self
    }

    /// Print each stdout chunk, followed by a newline, to this process's
    /// stdout as it arrives.
    ///
    /// Chunks that are not valid UTF-8 are skipped.
    pub fn printing_output(&self) -> &Self {
        let task = self.id();
        self.output_with(move |chunk| {
            let mut stdout = io::stdout().lock();
            if let Err(e) = print_chunk(&mut stdout, chunk) {
                debug!(task, error = %e, "writing chunk to stdout failed");
            }
        })
    }
}

/// Write `chunk` and a newline to `out` if it decodes as UTF-8.
///
/// Returns whether anything was written.
fn print_chunk(out: &mut impl Write, chunk: &[u8]) -> io::Result<bool> {
    let text = match std::str::from_utf8(chunk) {
        Ok(text) => text,
        Err(e) => {
            debug!(bytes = chunk.len(), error = %e, "skipping chunk that is not valid UTF-8");
            return Ok(false);
        }
    };
    writeln!(out, "{text}")?;
    out.flush()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_chunk_writes_decoded_text_with_newline() {
        let mut out = Vec::new();
        assert!(print_chunk(&mut out, b"hello").unwrap());
        assert!(print_chunk(&mut out, "caf\u{e9}".as_bytes()).unwrap());
        assert_eq!(out, "hello\ncaf\u{e9}\n".as_bytes());
    }

    #[test]
    fn print_chunk_skips_invalid_utf8() {
        let mut out = Vec::new();
        assert!(!print_chunk(&mut out, &[0xff, 0xfe]).unwrap());
        assert!(print_chunk(&mut out, b"ok").unwrap());
        assert_eq!(out, b"ok\n");
    }
}
