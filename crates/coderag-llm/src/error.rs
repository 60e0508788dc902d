#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("server error from {provider} (status {status})")]
    Server { provider: &'static str, status: u16 },

    #[error("{provider} rejected the credentials (status {status})")]
    Unauthorized { provider: &'static str, status: u16 },

    #[error("{provider} rejected the request (status {status}): {body}")]
    Client {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("expected {expected} embeddings from {provider}, got {actual}")]
    CountMismatch {
        provider: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// One failure shared by every entry of a failed batch.
    #[error("{0}")]
    Shared(std::sync::Arc<LlmError>),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    ///
    /// Network failures, timeouts, rate limiting and 5xx responses are
    /// transient. Authentication failures, other 4xx responses and malformed
    /// payloads are permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder() && !e.is_decode() && !e.is_redirect(),
            Self::RateLimited | Self::Server { .. } => true,
            Self::Shared(inner) => inner.is_transient(),
            Self::Json(_)
            | Self::Unauthorized { .. }
            | Self::Client { .. }
            | Self::EmptyResponse { .. }
            | Self::CountMismatch { .. }
            | Self::DimensionMismatch { .. }
            | Self::Other(_) => false,
        }
    }

    /// Whether the provider rejected the credentials. Retrying with the same
    /// key, batched or not, cannot succeed.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Unauthorized { .. } => true,
            Self::Shared(inner) => inner.is_unauthorized(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
