use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::embedding::{EmbeddingError, EmbeddingGateway, hashed_bag_of_words};

/// In-process embedder for tests.
///
/// Produces [`hashed_bag_of_words`] vectors and can be told to fail on
/// particular inputs or to stall its first calls.
#[derive(Debug)]
pub struct MockEmbedder {
    dim: usize,
    fail_on: Vec<String>,
    stall_first: usize,
    stall: Duration,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            fail_on: Vec::new(),
            stall_first: 0,
            stall: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails any text containing `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    /// Sleeps for `stall` on the first `calls` invocations.
    pub fn stalling_first(mut self, calls: usize, stall: Duration) -> Self {
        self.stall_first = calls;
        self.stall = stall;
        self
    }

    /// Number of `embed` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingGateway for MockEmbedder {
    fn embedding_dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if call < self.stall_first {
            tokio::time::sleep(self.stall).await;
        }

        if self.fail_on.iter().any(|needle| text.contains(needle)) {
            return Err(EmbeddingError::RequestFailed {
                url: "mock://embedder".to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        Ok(hashed_bag_of_words(text, self.dim))
    }
}
