//! Batching, truncation and bounded concurrency on top of an [`EmbeddingProvider`].

use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use tokio::sync::Semaphore;

use crate::error::LlmError;
use crate::provider::EmbeddingProvider;
use crate::truncate::{DEFAULT_MAX_INPUT_CHARS, truncate_input};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderConfig {
    /// Inputs per provider request.
    pub batch_size: usize,
    /// In-flight provider requests across all callers of one client.
    pub max_concurrent_requests: usize,
    pub max_input_chars: usize,
    /// Expected vector length. Learned from the first response when unset.
    pub dimensions: Option<usize>,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_concurrent_requests: 4,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            dimensions: None,
        }
    }
}

/// Embedding client shared by ingestion and retrieval.
///
/// Every provider call holds a permit from one semaphore, so the number of
/// concurrent requests never exceeds `max_concurrent_requests` no matter how
/// many tasks use the client.
#[derive(Debug)]
pub struct EmbeddingClient<P> {
    provider: P,
    config: EmbedderConfig,
    permits: Arc<Semaphore>,
    dimension: OnceLock<usize>,
}

impl<P: EmbeddingProvider> EmbeddingClient<P> {
    #[must_use]
    pub fn new(provider: P, config: EmbedderConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));
        let dimension = OnceLock::new();
        if let Some(d) = config.dimensions {
            let _ = dimension.set(d);
        }
        Self {
            provider,
            config,
            permits,
            dimension,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Vector length, once configured or observed.
    #[must_use]
    pub fn dimensions(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    #[must_use]
    pub fn config(&self) -> &EmbedderConfig {
        &self.config
    }

    /// Embed one text.
    ///
    /// # Errors
    ///
    /// Returns the provider error, or `DimensionMismatch` when the vector has
    /// the wrong length.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let input = truncate_input(text, self.config.max_input_chars);
        let vector = {
            let _permit = self.acquire().await?;
            self.provider.embed(input).await?
        };
        self.check_dimension(vector)
    }

    /// Embed many texts, returning exactly one result per input, in input order.
    ///
    /// Inputs are grouped into batches of `batch_size`. A batch rejected with a
    /// permanent error is retried entry by entry so one bad input cannot fail
    /// its neighbours. A batch that still fails transiently after the
    /// provider's own retries, or whose credentials were rejected, fails every
    /// entry with the same shared error.
    pub async fn embed_many(&self, texts: &[String]) -> Vec<Result<Vec<f32>, LlmError>> {
        if texts.is_empty() {
            return Vec::new();
        }
        let batch_size = self.config.batch_size.max(1);
        let concurrency = self.config.max_concurrent_requests.max(1);

        let batches: Vec<Vec<Result<Vec<f32>, LlmError>>> =
            futures::stream::iter(texts.chunks(batch_size))
                .map(|chunk| self.embed_chunk(chunk))
                .buffered(concurrency)
                .collect()
                .await;

        batches.into_iter().flatten().collect()
    }

    async fn embed_chunk(&self, chunk: &[String]) -> Vec<Result<Vec<f32>, LlmError>> {
        let inputs: Vec<String> = chunk
            .iter()
            .map(|t| truncate_input(t, self.config.max_input_chars).to_owned())
            .collect();

        let outcome = match self.acquire().await {
            Ok(_permit) => self.provider.embed_batch(&inputs).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(vectors) if vectors.len() == inputs.len() => vectors
                .into_iter()
                .map(|v| self.check_dimension(v))
                .collect(),
            Ok(vectors) => {
                let err = Arc::new(LlmError::CountMismatch {
                    provider: "embedder",
                    expected: inputs.len(),
                    actual: vectors.len(),
                });
                inputs
                    .iter()
                    .map(|_| Err(LlmError::Shared(Arc::clone(&err))))
                    .collect()
            }
            Err(e) if inputs.len() == 1 => vec![Err(e)],
            Err(e) if e.is_unauthorized() => {
                tracing::error!(
                    provider = self.provider.name(),
                    batch = inputs.len(),
                    "embedding credentials rejected: {e}"
                );
                let err = Arc::new(e);
                inputs
                    .iter()
                    .map(|_| Err(LlmError::Shared(Arc::clone(&err))))
                    .collect()
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    provider = self.provider.name(),
                    batch = inputs.len(),
                    "embedding batch failed after retries: {e}"
                );
                let err = Arc::new(e);
                inputs
                    .iter()
                    .map(|_| Err(LlmError::Shared(Arc::clone(&err))))
                    .collect()
            }
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    batch = inputs.len(),
                    "embedding batch rejected ({e}), retrying entries individually"
                );
                let mut out = Vec::with_capacity(inputs.len());
                for input in &inputs {
                    let result = match self.acquire().await {
                        Ok(_permit) => self.provider.embed(input).await,
                        Err(e) => Err(e),
                    };
                    out.push(result.and_then(|v| self.check_dimension(v)));
                }
                out
            }
        }
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, LlmError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| LlmError::Other("embedding client closed".into()))
    }

    fn check_dimension(&self, vector: Vec<f32>) -> Result<Vec<f32>, LlmError> {
        let expected = *self.dimension.get_or_init(|| vector.len());
        if vector.len() == expected {
            Ok(vector)
        } else {
            Err(LlmError::DimensionMismatch {
                expected,
                actual: vector.len(),
            })
        }
    }
}
