#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::RagError;
use crate::config::ProviderConfig;
use crate::embeddings::http::HttpClient;
use crate::embeddings::{Embedding, EmbeddingProvider, ensure_batch_len};

/// Embedding backend for OpenAI-compatible `/v1/embeddings` endpoints
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    base_url: Url,
    model: String,
    batch_size: usize,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    /// Create a provider, reading the API key from the configured environment variable
    #[inline]
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).with_context(|| {
            format!(
                "Environment variable {} must hold the API key",
                config.api_key_env
            )
        })?;
        Self::with_api_key(config, api_key)
    }

    #[inline]
    pub fn with_api_key(config: &ProviderConfig, api_key: String) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to generate embeddings URL from config")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: (config.batch_size as usize).max(1),
            http: HttpClient::new(
                Duration::from_secs(config.timeout_seconds),
                config.retry_attempts,
            )
            .with_bearer_token(api_key),
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.http = self.http.with_retry_attempts(attempts);
        self
    }

    /// Embed `texts` in sub-batches of the configured size, preserving order
    #[inline]
    pub fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self
            .base_url
            .join("/v1/embeddings")
            .context("Failed to build embeddings URL")?;

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let request = EmbeddingsRequest {
                model: &self.model,
                input: chunk,
            };

            let response: EmbeddingsResponse = self
                .http
                .post_json(&url, &request)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;

            results.extend(order_by_index(response.data, chunk.len())?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }
}

/// Place each returned vector at the input position named by its `index`
fn order_by_index(data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Embedding>> {
    if data.len() != expected {
        return Err(anyhow::anyhow!(
            "Mismatch between request and response counts: {} vs {}",
            expected,
            data.len()
        ));
    }

    let mut slots: Vec<Option<Embedding>> = vec![None; expected];
    for item in data {
        let slot = slots
            .get_mut(item.index)
            .ok_or_else(|| anyhow::anyhow!("Response index {} out of range", item.index))?;
        if slot.replace(item.embedding).is_some() {
            return Err(anyhow::anyhow!("Duplicate response index {}", item.index));
        }
    }

    // every slot is filled: counts match and no index repeated
    Ok(slots.into_iter().flatten().collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, batch: &[String]) -> crate::Result<Vec<Embedding>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let provider = self.clone();
        let texts = batch.to_vec();
        let embeddings = tokio::task::spawn_blocking(move || provider.embed_blocking(&texts))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {e}")))?
            .map_err(|e| RagError::Embedding(format!("{e:#}")))?;

        ensure_batch_len(batch.len(), &embeddings)?;
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
