// src/process/stream.rs

//! Buffered byte stream fed from one of the child's pipes.

use std::sync::Mutex;

use tokio::sync::watch;
use tracing::{trace, warn};

use crate::sync::lock;

/// Result of a non-blocking drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Available {
    /// Bytes that arrived since the previous drain. Never empty.
    Data(Vec<u8>),
    /// Nothing buffered, but more may still arrive.
    Empty,
    /// End of stream and nothing left to read.
    Closed,
}

#[derive(Debug)]
struct StreamState {
    pending: Vec<u8>,
    closed: bool,
    total: u64,
    limit: usize,
    dropped: u64,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            closed: false,
            total: 0,
            limit: usize::MAX,
            dropped: 0,
        }
    }
}

/// A readable byte source backed by a child's stdout or stderr.
///
/// The process supervisor pushes bytes as they are read from the pipe and
/// closes the stream at end-of-file. Readers either drain whatever is
/// buffered right now ([`OutputStream::available`]) or wait for end-of-stream
/// ([`OutputStream::read_to_end`]).
#[derive(Debug)]
pub struct OutputStream {
    name: &'static str,
    state: Mutex<StreamState>,
    closed_tx: watch::Sender<bool>,
}

impl OutputStream {
    pub fn new(name: &'static str) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            name,
            state: Mutex::new(StreamState::default()),
            closed_tx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cap the unread backlog at `limit` bytes, keeping the newest.
    pub(crate) fn set_limit(&self, limit: usize) {
        lock(&self.state).limit = limit.max(1);
    }

    pub(crate) fn push(&self, bytes: &[u8]) {
        let mut state = lock(&self.state);
        if state.closed {
            return;
        }
        state.pending.extend_from_slice(bytes);
        state.total += bytes.len() as u64;

        let excess = state.pending.len().saturating_sub(state.limit);
        if excess > 0 {
            state.pending.drain(..excess);
            if state.dropped == 0 {
                warn!(
                    stream = self.name,
                    limit = state.limit,
                    "unread output exceeds buffer limit; discarding oldest bytes"
                );
            }
            state.dropped += excess as u64;
        }
    }

    /// Mark end-of-stream. Idempotent.
    pub(crate) fn close(&self) {
        let mut state = lock(&self.state);
        if state.closed {
            return;
        }
        state.closed = true;
        trace!(stream = self.name, total_bytes = state.total, "stream closed");
        drop(state);
        self.closed_tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Total number of bytes ever pushed into this stream.
    pub fn total_bytes(&self) -> u64 {
        lock(&self.state).total
    }

    /// Bytes discarded because nobody read them before the backlog limit.
    pub fn dropped_bytes(&self) -> u64 {
        lock(&self.state).dropped
    }

    /// Take everything buffered right now without waiting.
    pub fn available(&self) -> Available {
        let mut state = lock(&self.state);
        if !state.pending.is_empty() {
            return Available::Data(std::mem::take(&mut state.pending));
        }
        if state.closed {
            Available::Closed
        } else {
            Available::Empty
        }
    }

    /// Wait for end-of-stream, then take all remaining bytes.
    pub async fn read_to_end(&self) -> Vec<u8> {
        let mut closed_rx = self.closed_tx.subscribe();
        // The sender lives in `self`, so this only resolves once closed.
        let _ = closed_rx.wait_for(|closed| *closed).await;
        std::mem::take(&mut lock(&self.state).pending)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn available_reports_data_then_empty_then_closed() {
        let stream = OutputStream::new("stdout");
        assert_eq!(stream.available(), Available::Empty);

        stream.push(b"ab");
        stream.push(b"c");
        assert_eq!(stream.available(), Available::Data(b"abc".to_vec()));
        assert_eq!(stream.available(), Available::Empty);

        stream.push(b"d");
        stream.close();
        assert_eq!(stream.available(), Available::Data(b"d".to_vec()));
        assert_eq!(stream.available(), Available::Closed);
        assert_eq!(stream.total_bytes(), 4);
    }

    #[test]
    fn push_after_close_is_ignored() {
        let stream = OutputStream::new("stderr");
        stream.close();
        stream.close();
        stream.push(b"late");
        assert_eq!(stream.available(), Available::Closed);
    }

    #[test]
    fn backlog_over_limit_keeps_newest_bytes() {
        let stream = OutputStream::new("stderr");
        stream.set_limit(4);

        stream.push(b"abc");
        stream.push(b"defg");
        assert_eq!(stream.dropped_bytes(), 3);
        assert_eq!(stream.total_bytes(), 7);
        assert_eq!(stream.available(), Available::Data(b"defg".to_vec()));

        // A reader that keeps up never loses anything.
        stream.push(b"hi");
        assert_eq!(stream.available(), Available::Data(b"hi".to_vec()));
        assert_eq!(stream.dropped_bytes(), 3);
    }

    #[tokio::test]
    async fn read_to_end_waits_for_close() {
        let stream = Arc::new(OutputStream::new("stdout"));
        let reader = {
            let stream = Arc::clone(&stream);
            tokio::spawn(async move { stream.read_to_end().await })
        };

        stream.push(b"hello ");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        stream.push(b"world");
        stream.close();

        let bytes = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("read_to_end did not finish")
            .unwrap();
        assert_eq!(bytes, b"hello world");
    }
}
