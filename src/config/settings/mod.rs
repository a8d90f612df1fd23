
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::EmbedderProvider;

/// Environment variable that overrides the default base directory
pub const BASE_DIR_ENV: &str = "CODE_INDEX_HOME";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub dependencies: DependencyConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedderConfig {
    pub provider: EmbedderProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Manual vector width, used when the model is not in the profile table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    pub ollama: OllamaConfig,
    pub openai: ApiKeyConfig,
    pub openai_compatible: OpenAiCompatibleConfig,
    pub gemini: ApiKeyConfig,
    pub mistral: ApiKeyConfig,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::Ollama,
            model_id: None,
            dimension: None,
            ollama: OllamaConfig::default(),
            openai: ApiKeyConfig::default(),
            openai_compatible: OpenAiCompatibleConfig::default(),
            gemini: ApiKeyConfig::default(),
            mistral: ApiKeyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiKeyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OpenAiCompatibleConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    #[default]
    Lancedb,
    Qdrant,
}

impl std::fmt::Display for VectorStoreBackend {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lancedb => write!(f, "lancedb"),
            Self::Qdrant => write!(f, "qdrant"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorStoreBackend,
    /// Root for per-workspace LanceDB directories, defaults to `<base_dir>/vectors`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lancedb_directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexingConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub search_min_score: f32,
    pub search_max_results: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 60,
            max_retries: 3,
            search_min_score: crate::database::DEFAULT_SEARCH_MIN_SCORE,
            search_max_results: crate::database::DEFAULT_MAX_SEARCH_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DependencyConfig {
    /// Isolated install directory, defaults to `<base_dir>/native-deps`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub package_manager: String,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            directory: None,
            package_manager: "npm".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid max retries: {0} (must be between 1 and 10)")]
    InvalidMaxRetries(u32),
    #[error("Invalid minimum search score: {0} (must be between 0 and 1)")]
    InvalidMinScore(f32),
    #[error("Invalid maximum search results: {0} (must be between 1 and 1000)")]
    InvalidMaxResults(usize),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 8192)")]
    InvalidDimension(u32),
    #[error("Invalid package manager: cannot be empty")]
    InvalidPackageManager,
    #[error("{field} missing for {provider} configuration")]
    MissingProviderSetting {
        provider: String,
        field: &'static str,
    },
    #[error(
        "Could not determine vector dimension for model '{model}' with provider '{provider}'. Set embedder.dimension explicitly"
    )]
    UndeterminedDimension { provider: String, model: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default base directory: `$CODE_INDEX_HOME`, else `~/.code-index`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(BASE_DIR_ENV).filter(|dir| !dir.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        dirs::home_dir()
            .map(|home| home.join(".code-index"))
            .or_else(|| dirs::data_dir().map(|data| data.join("code-index")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedder.validate()?;
        self.indexing.validate()?;

        if self.dependencies.package_manager.trim().is_empty() {
            return Err(ConfigError::InvalidPackageManager);
        }

        if let Some(url) = &self.vector_store.qdrant_url {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Root directory under which each workspace gets its own LanceDB directory
    #[inline]
    pub fn vector_database_root(&self) -> PathBuf {
        self.vector_store
            .lancedb_directory
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("vectors"))
    }

    /// Isolated directory for the native driver packages
    #[inline]
    pub fn dependency_dir(&self) -> PathBuf {
        self.dependencies
            .directory
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("native-deps"))
    }
}

impl EmbedderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;

        if let Some(dimension) = self.dimension {
            if !(1..=8192).contains(&dimension) {
                return Err(ConfigError::InvalidDimension(dimension));
            }
        }

        if let Some(base_url) = &self.openai_compatible.base_url {
            Url::parse(base_url).map_err(|_| ConfigError::InvalidUrl(base_url.clone()))?;
        }

        Ok(())
    }

    /// Model configured for the active provider, if any
    pub fn model_id(&self) -> Option<&str> {
        self.model_id
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
    }
}

impl IndexingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=10).contains(&self.max_retries) {
            return Err(ConfigError::InvalidMaxRetries(self.max_retries));
        }

        if !(0.0..=1.0).contains(&self.search_min_score) {
            return Err(ConfigError::InvalidMinScore(self.search_min_score));
        }

        if self.search_max_results == 0 || self.search_max_results > 1000 {
            return Err(ConfigError::InvalidMaxResults(self.search_max_results));
        }

        Ok(())
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }
}
