#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::RagError;
use crate::config::ProviderConfig;
use crate::embeddings::http::HttpClient;
use crate::embeddings::{Embedding, EmbeddingProvider, ensure_batch_len};

/// Embedding backend talking to an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: Url,
    model: String,
    batch_size: usize,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaProvider {
    #[inline]
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: (config.batch_size as usize).max(1),
            http: HttpClient::new(
                Duration::from_secs(config.timeout_seconds),
                config.retry_attempts,
            ),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_timeout(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.http = self.http.with_retry_attempts(attempts);
        self
    }

    /// Test connection to the Ollama server and verify the model is available
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;

        if !models.iter().any(|m| m.name == self.model) {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available_models
            );
            return Err(anyhow::anyhow!(
                "Model '{}' is not available. Available models: {:?}",
                self.model,
                available_models
            ));
        }

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// List all models the server has pulled
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self.http.get_text(&url).context("Failed to fetch models")?;
        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Embed `texts` in sub-batches of the configured size, preserving order
    #[inline]
    pub fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let request = BatchEmbedRequest {
                model: &self.model,
                input: chunk,
            };

            let response: BatchEmbedResponse = self
                .http
                .post_json(&url, &request)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;

            if response.embeddings.len() != chunk.len() {
                return Err(anyhow::anyhow!(
                    "Mismatch between request and response counts: {} vs {}",
                    chunk.len(),
                    response.embeddings.len()
                ));
            }

            results.extend(response.embeddings);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
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
