// OpenAI-style `/embeddings` client
// Also serves Gemini and Mistral through their OpenAI-compatible endpoints.


use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::http::HttpClient;
use super::{Embedder, EmbedderProvider, ValidationResult};
use crate::config::ConfigError;
use crate::{CodeIndexError, Result};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleEmbedder {
    provider: EmbedderProvider,
    endpoint: String,
    model: String,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiCompatibleEmbedder {
    #[inline]
    pub fn new(
        provider: EmbedderProvider,
        base_url: &str,
        api_key: &str,
        model: &str,
    ) -> Result<Self> {
        Url::parse(base_url).map_err(|_| ConfigError::InvalidUrl(base_url.to_string()))?;

        Ok(Self {
            provider,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            http: HttpClient::default().with_bearer_token(api_key),
        })
    }

    /// Replace the HTTP client; the bearer token must be set on the new one
    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn embed_blocking(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        debug!(
            "Requesting {} embeddings from {} ({})",
            texts.len(),
            self.endpoint,
            self.provider
        );

        let request_json = serde_json::to_string(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        })
        .context("Failed to serialize embedding request")?;

        let response_text = self
            .http
            .post_json(&self.endpoint, &request_json)
            .with_context(|| format!("Failed to generate embeddings with {}", self.provider))?;
        let mut response: EmbeddingResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        if response.data.len() != texts.len() {
            return Err(anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            ));
        }

        response.data.sort_by_key(|data| data.index);
        Ok(response
            .data
            .into_iter()
            .map(|data| data.embedding)
            .collect())
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
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

    /// A one-text request exercises the key, the endpoint and the model together
    async fn validate_configuration(&self) -> ValidationResult {
        match self.create_embeddings(&["test".to_string()]).await {
            Ok(vectors) if vectors.first().is_some_and(|v| !v.is_empty()) => {
                ValidationResult::ok()
            }
            Ok(_) => ValidationResult::failed("Provider returned an empty embedding"),
            Err(e) => ValidationResult::failed(e.to_string()),
        }
    }

    #[inline]
    fn provider(&self) -> EmbedderProvider {
        self.provider
    }
}
