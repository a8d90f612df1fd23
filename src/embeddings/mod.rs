// Embeddings module
// Providers that turn code chunks into vectors for the vector store


pub mod http;
pub mod models;
pub mod ollama;
pub mod openai;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiCompatibleEmbedder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

/// Embedding providers the factory knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EmbedderProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[default]
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "mistral")]
    Mistral,
}

impl EmbedderProvider {
    pub const ALL: &[Self] = &[
        Self::OpenAi,
        Self::Ollama,
        Self::OpenAiCompatible,
        Self::Gemini,
        Self::Mistral,
    ];

    /// Identifier used in configuration files
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::OpenAiCompatible => "openai-compatible",
            Self::Gemini => "gemini",
            Self::Mistral => "mistral",
        }
    }
}

impl fmt::Display for EmbedderProvider {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking an embedder's configuration against its server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    #[inline]
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    #[inline]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order
    async fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn validate_configuration(&self) -> ValidationResult;

    fn provider(&self) -> EmbedderProvider;
}
