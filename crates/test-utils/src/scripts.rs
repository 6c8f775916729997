//! Tasks whose children behave in a known way, built on `sh -c`.

use std::sync::{Arc, Mutex};

use doer::Task;

/// A task running `script` through `sh -c`.
pub fn sh(script: &str) -> Task {
    doer::task("sh", ["-c", script])
}

/// Collects every chunk a task delivers to its progress callback.
#[derive(Debug, Clone, Default)]
pub struct ChunkRecorder {
    chunks: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ChunkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach this recorder to `task` as a streaming sink.
    pub fn attach(&self, task: &Task) {
        let chunks = Arc::clone(&self.chunks);
        task.output_with(move |chunk| chunks.lock().unwrap().push(chunk.to_vec()));
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All chunks concatenated, lossily decoded.
    pub fn text(&self) -> String {
        let bytes: Vec<u8> = self.chunks().concat();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
