mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use coderag_index::{ExtractOptions, IndexerConfig};
use coderag_llm::{EmbedderConfig, RetryPolicy};
use coderag_memory::QdrantSettings;

use crate::vault::{Secret, VaultProvider};

pub const OPENAI_API_KEY_VAR: &str = "CODERAG_OPENAI_API_KEY";
pub const QDRANT_API_KEY_VAR: &str = "CODERAG_QDRANT_API_KEY";

/// Invalid or incomplete configuration, detected before any component is built.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing secret {0}")]
    MissingSecret(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("secret {name} was rejected: {reason}")]
    RejectedSecret { name: &'static str, reason: String },
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to sensible defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Resolve sensitive configuration values through the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        if let Some(val) = vault.get_secret(OPENAI_API_KEY_VAR).await? {
            self.secrets.openai_api_key = Some(Secret::new(val));
        }
        if let Some(val) = vault.get_secret(QDRANT_API_KEY_VAR).await? {
            self.secrets.qdrant_api_key = Some(Secret::new(val));
        }
        Ok(())
    }

    /// Check the configuration once, before anything is built from it.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.provider == EmbeddingProviderKind::OpenAi
            && self.secrets.openai_api_key.is_none()
        {
            return Err(ConfigError::MissingSecret(OPENAI_API_KEY_VAR));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(invalid("embedding.model", "must not be empty"));
        }
        if !is_http_url(&self.embedding.base_url) {
            return Err(invalid(
                "embedding.base_url",
                format!("expected http(s) URL, got {:?}", self.embedding.base_url),
            ));
        }
        if self.embedding.dimensions == Some(0) {
            return Err(invalid("embedding.dimensions", "must be positive"));
        }
        if self.vector_store.collection.trim().is_empty() {
            return Err(invalid("vector_store.collection", "must not be empty"));
        }
        if !is_http_url(&self.vector_store.url) {
            return Err(invalid(
                "vector_store.url",
                format!("expected http(s) URL, got {:?}", self.vector_store.url),
            ));
        }
        if self.index.sqlite_path.trim().is_empty() {
            return Err(invalid("index.sqlite_path", "must not be empty"));
        }

        for (field, value) in [
            ("embedding.batch_size", self.embedding.batch_size),
            (
                "embedding.max_concurrent_requests",
                self.embedding.max_concurrent_requests,
            ),
            ("embedding.max_input_chars", self.embedding.max_input_chars),
            ("index.file_concurrency", self.index.file_concurrency),
            ("retrieval.top_k", self.retrieval.top_k),
            ("retrieval.match_cap", self.retrieval.match_cap),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be positive"));
            }
        }
        for (field, value) in [
            ("timeouts.embedding_seconds", self.timeouts.embedding_seconds),
            ("timeouts.index_seconds", self.timeouts.index_seconds),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be a finite positive timeout"));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn embedder_config(&self) -> EmbedderConfig {
        EmbedderConfig {
            batch_size: self.embedding.batch_size,
            max_concurrent_requests: self.embedding.max_concurrent_requests,
            max_input_chars: self.embedding.max_input_chars,
            dimensions: self.embedding.dimensions,
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.embedding.max_retries,
            ..RetryPolicy::default()
        }
    }

    #[must_use]
    pub fn qdrant_settings(&self) -> QdrantSettings {
        QdrantSettings {
            url: self.vector_store.url.clone(),
            api_key: self
                .secrets
                .qdrant_api_key
                .as_ref()
                .map(|s| s.expose().to_owned()),
            collection: self.vector_store.collection.clone(),
            timeout: Duration::from_secs(self.timeouts.index_seconds),
        }
    }

    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            extract: ExtractOptions {
                extract_methods: self.index.extract_methods,
                file_fallback: self.index.file_fallback,
            },
            file_concurrency: self.index.file_concurrency,
            prune_stale: self.index.prune_stale,
        }
    }

    #[must_use]
    pub fn retrieval_config(&self) -> coderag_index::RetrievalConfig {
        coderag_index::RetrievalConfig {
            top_k: self.retrieval.top_k,
            match_cap: self.retrieval.match_cap,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
