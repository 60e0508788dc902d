use std::future::Future;

use crate::error::LlmError;

/// A remote (or local) service that turns text into fixed-dimension vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is invalid.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    /// Embed several texts in one request, returning vectors in input order.
    ///
    /// The default implementation issues one `embed` call per text.
    ///
    /// # Errors
    ///
    /// Returns an error if any request fails; the whole batch is then failed.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send {
        async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }

    /// Embedding model identifier. Together with the vector dimension it
    /// identifies the vector space a namespace is bound to.
    fn model(&self) -> &str;

    fn name(&self) -> &str;
}
