// Embeddings module
// Turns text into dense vectors; the Ollama client is the production provider

pub mod ollama;

use async_trait::async_trait;
use thiserror::Error;

pub use ollama::OllamaClient;

/// Failure of an embedding call. The vector store never sees these; the
/// enclosing operation aborts before taking any lock.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Embedding request failed: {0}")]
    Request(String),
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("Embedding provider returned an empty vector")]
    EmptyEmbedding,
}

/// Maps a text to a fixed-dimension embedding vector.
///
/// The dimension must stay constant for the lifetime of a given index.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed several texts, one vector per text in input order. Providers
    /// with a native batch endpoint override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Name of the model producing the vectors, for status output
    fn model_name(&self) -> &str;
}

#[async_trait]
impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for std::sync::Arc<P> {
    #[inline]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        (**self).embed(text).await
    }

    #[inline]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        (**self).embed_batch(texts).await
    }

    #[inline]
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}
