// Embeddings module
// Page chunking and the embedding backends that turn chunk text into vectors

pub mod chunking;
pub mod http;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ProviderConfig, ProviderKind};

pub use chunking::{Chunk, ChunkCandidate, ChunkingConfig, chunk_page};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// A dense embedding vector
pub type Embedding = Vec<f32>;

/// Capability interface over an external text embedding service.
///
/// Implementations must return exactly one vector per input, in input order,
/// and every vector produced by one instance must have the same dimension.
/// A failure anywhere in the batch fails the whole call.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, batch: &[String]) -> crate::Result<Vec<Embedding>>;

    /// Name of the model backing this provider, used in log output
    fn model_name(&self) -> &str;
}

/// Build the embedding backend selected in the configuration
#[inline]
pub fn provider_from_config(config: &ProviderConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.kind {
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(config)?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config)?),
    };
    Ok(provider)
}

/// Check that a backend response matches the request it answers
pub(crate) fn ensure_batch_len(expected: usize, embeddings: &[Embedding]) -> crate::Result<()> {
    if embeddings.len() != expected {
        return Err(crate::RagError::Embedding(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected,
            embeddings.len()
        )));
    }
    Ok(())
}
