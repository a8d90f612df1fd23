#[cfg(test)]
mod tests;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::http::HttpClient;
use super::models::default_model_id;
use super::{Embedder, EmbedderProvider, ValidationResult};
use crate::config::OllamaConfig;
use crate::{CodeIndexError, Result};

/// Embedder backed by a local Ollama server
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: Url,
    model: String,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
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

impl OllamaEmbedder {
    /// Build an embedder for `model`, or the default Ollama model when none is given
    #[inline]
    pub fn new(config: &OllamaConfig, model: Option<&str>) -> Result<Self> {
        let base_url = config.ollama_url()?;

        Ok(Self {
            base_url,
            model: model
                .unwrap_or_else(|| default_model_id(EmbedderProvider::Ollama))
                .to_string(),
            http: HttpClient::default(),
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// List the models installed on the server
    #[inline]
    pub fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .http
            .get(url.as_str())
            .context("Failed to fetch models")?;
        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Check that the server answers and has the configured model pulled
    #[inline]
    pub fn check_model(&self) -> anyhow::Result<()> {
        let models = self.list_models()?;

        if models.iter().any(|m| self.matches_model(&m.name)) {
            info!(
                "Ollama server at {} has model {}",
                self.base_url, self.model
            );
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available
            );
            Err(anyhow!(
                "Model '{}' is not available. Available models: {:?}",
                self.model,
                available
            ))
        }
    }

    /// `nomic-embed-text` matches an installed `nomic-embed-text:latest`
    fn matches_model(&self, installed: &str) -> bool {
        installed == self.model
            || (!self.model.contains(':')
                && installed
                    .split_once(':')
                    .is_some_and(|(name, _tag)| name == self.model))
    }

    fn embed_blocking(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        debug!("Generating embeddings for {} texts", texts.len());

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;
        let request_json = serde_json::to_string(&EmbedRequest {
            model: &self.model,
            input: texts,
        })
        .context("Failed to serialize embedding request")?;

        let response_text = self
            .http
            .post_json(url.as_str(), &request_json)
            .context("Failed to generate embeddings")?;
        let response: EmbedResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || embedder.embed_blocking(&texts))
            .await
            .map_err(|e| CodeIndexError::Embedding(format!("Embedding task failed: {}", e)))?
            .map_err(|e| CodeIndexError::Embedding(format!("{:#}", e)))
    }

    async fn validate_configuration(&self) -> ValidationResult {
        let embedder = self.clone();
        match tokio::task::spawn_blocking(move || embedder.check_model()).await {
            Ok(Ok(())) => ValidationResult::ok(),
            Ok(Err(e)) => ValidationResult::failed(format!("{:#}", e)),
            Err(e) => ValidationResult::failed(format!("Validation task failed: {}", e)),
        }
    }

    #[inline]
    fn provider(&self) -> EmbedderProvider {
        EmbedderProvider::Ollama
    }
}
