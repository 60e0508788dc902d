//! Query-time retrieval and context assembly.

use std::sync::Arc;

use coderag_llm::{EmbeddingClient, EmbeddingProvider};
use tokio_util::sync::CancellationToken;

use crate::error::{IndexError, Result};
use crate::namespace::Namespace;
use crate::store::{CodeStore, TEXT_FIELD};

const CONTEXT_OPEN: &str = "<CONTEXT>\n";
const MATCH_SEPARATOR: &str = "\n\n-------\n\n";
const CONTEXT_CLOSE: &str = "\n-------\n</CONTEXT>\n\n\n\nMY QUESTION:\n";

const SYSTEM_PROMPT: &str = "You are a Senior Software Engineer, specializing in TypeScript.

Answer any questions I have about the codebase, based on the code provided. \
Always consider all of the context provided when forming a response.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Matches requested from the vector index.
    pub top_k: usize,
    /// Matches concatenated into the context.
    pub match_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            match_cap: 10,
        }
    }
}

/// One retrieved unit, in index order.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: String,
    pub score: f32,
    pub text: String,
}

/// The augmented prompt and the matches it was built from.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    pub matches: Vec<Match>,
}

impl AssembledContext {
    /// True when no unit matched; `text` still carries the frame and question.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Embeds a question, retrieves the closest units of one namespace and frames
/// them into one prompt string.
pub struct ContextAssembler<P> {
    store: Arc<CodeStore>,
    embedder: Arc<EmbeddingClient<P>>,
    config: RetrievalConfig,
}

impl<P: EmbeddingProvider> ContextAssembler<P> {
    #[must_use]
    pub fn new(
        store: Arc<CodeStore>,
        embedder: Arc<EmbeddingClient<P>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Build the augmented prompt for `query` from `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Cancelled` if `cancel` fires before the query is
    /// embedded (no vector query is issued then), or the embedding or vector
    /// index error.
    pub async fn assemble(
        &self,
        namespace: &Namespace,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<AssembledContext> {
        let vector = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(IndexError::Cancelled),
            vector = self.embedder.embed(query) => vector?,
        };

        let hits = self
            .store
            .query(namespace, vector, self.config.top_k)
            .await?;

        let matches: Vec<Match> = hits
            .into_iter()
            .take(self.config.match_cap)
            .map(|hit| Match {
                text: hit
                    .payload
                    .get(TEXT_FIELD)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned(),
                id: hit.id,
                score: hit.score,
            })
            .collect();

        if matches.is_empty() {
            tracing::info!(namespace = %namespace, "no matching units");
        } else {
            tracing::debug!(namespace = %namespace, matches = matches.len(), "context assembled");
        }

        let texts: Vec<&str> = matches.iter().map(|m| m.text.as_str()).collect();
        Ok(AssembledContext {
            text: format_context(&texts, query),
            matches,
        })
    }
}

/// Frame matched texts and the question into the augmented prompt.
#[must_use]
pub fn format_context(texts: &[&str], query: &str) -> String {
    let body = texts.join(MATCH_SEPARATOR);
    let mut out = String::with_capacity(
        CONTEXT_OPEN.len() + body.len() + CONTEXT_CLOSE.len() + query.len(),
    );
    out.push_str(CONTEXT_OPEN);
    out.push_str(&body);
    out.push_str(CONTEXT_CLOSE);
    out.push_str(query);
    out
}

/// Fixed system prompt for the downstream assistant.
#[must_use]
pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}
