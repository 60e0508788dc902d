//! Embedding client: provider abstraction, OpenAI-compatible backend,
//! retry with backoff, input truncation and bounded-concurrency batching.

pub mod any;
pub mod embedder;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;
pub mod provider;
pub(crate) mod retry;
pub mod truncate;

pub use embedder::{EmbedderConfig, EmbeddingClient};
pub use error::LlmError;
pub use provider::EmbeddingProvider;
pub use retry::RetryPolicy;
