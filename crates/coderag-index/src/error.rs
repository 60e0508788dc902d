//! Error types for coderag-index.

use std::num::TryFromIntError;

/// Errors that can occur during ingestion and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `SQLite` manifest error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Vector index request failed. Never swallowed.
    #[error("vector index error: {0}")]
    VectorStore(#[from] coderag_memory::VectorStoreError),

    /// Embedding request failed.
    #[error("embedding error: {0}")]
    Llm(#[from] coderag_llm::LlmError),

    /// Source text is not syntactically valid for its dialect.
    #[error("parse failed for {file}: {message}")]
    Parse { file: String, message: String },

    /// The namespace already holds vectors from another model or dimension.
    #[error("namespace {namespace} is bound to {expected}, got {actual}")]
    NamespaceMismatch {
        namespace: String,
        expected: String,
        actual: String,
    },

    #[error("namespace {0} is already being ingested")]
    AlreadyIngesting(String),

    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),

    #[error("operation cancelled")]
    Cancelled,

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
