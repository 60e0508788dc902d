//! Test-only deterministic embedding provider.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;
use crate::provider::EmbeddingProvider;

/// Derives vectors from the blake3 hash of the input, so equal texts always
/// map to equal vectors and different texts almost never do.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub dimension: usize,
    pub model: String,
    /// Inputs containing any of these markers fail with a permanent error.
    failing_markers: Arc<HashSet<String>>,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
    /// Reject every request as if the API key were revoked.
    pub reject_credentials: bool,
    calls: Arc<AtomicUsize>,
    batch_calls: Arc<AtomicUsize>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            dimension: 8,
            model: "mock-embedding".into(),
            failing_markers: Arc::new(HashSet::new()),
            delay_ms: 0,
            reject_credentials: false,
            calls: Arc::new(AtomicUsize::new(0)),
            batch_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Fail every input that contains `marker`.
    #[must_use]
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        let mut markers = (*self.failing_markers).clone();
        markers.insert(marker.into());
        self.failing_markers = Arc::new(markers);
        self
    }

    #[must_use]
    pub fn rejecting_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Number of texts embedded so far, across clones.
    #[must_use]
    pub fn embedded_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of provider calls (single or batch) so far, across clones.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// The vector this provider returns for `text`.
    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut reader = blake3::Hasher::new().update(text.as_bytes()).finalize_xof();
        let mut bytes = vec![0u8; self.dimension];
        reader.fill(&mut bytes);
        bytes
            .into_iter()
            .map(|b| f32::from(b) / 255.0 - 0.5)
            .collect()
    }

    fn check(&self, text: &str) -> Result<(), LlmError> {
        if self.reject_credentials {
            return Err(LlmError::Unauthorized {
                provider: "mock",
                status: 401,
            });
        }
        if self.failing_markers.iter().any(|m| text.contains(m.as_str())) {
            return Err(LlmError::Client {
                provider: "mock",
                status: 400,
                body: "mock rejected input".into(),
            });
        }
        Ok(())
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }
}

impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check(text)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        for text in texts {
            self.check(text)?;
        }
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
