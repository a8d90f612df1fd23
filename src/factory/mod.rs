// Service factory
// Turns a validated configuration into an embedder, a vector store and a batch indexer

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{ApiKeyConfig, Config, ConfigError, VectorStoreBackend};
use crate::database::VectorStore;
use crate::database::lancedb::{LanceDriver, LanceVectorStore};
use crate::database::qdrant::QdrantVectorStore;
use crate::dependencies::{DependencyManager, ProgressSink, SilentProgress};
use crate::embeddings::models::{default_model_id, get_model_dimension};
use crate::embeddings::openai::{GEMINI_BASE_URL, MISTRAL_BASE_URL, OPENAI_BASE_URL};
use crate::embeddings::{
    Embedder, EmbedderProvider, OllamaEmbedder, OpenAiCompatibleEmbedder, ValidationResult,
};
use crate::indexer::BatchIndexer;
use crate::{CodeIndexError, Result};

/// Everything a scanner needs to index one workspace
pub struct IndexingServices {
    pub embedder: Arc<dyn Embedder>,
    pub vector_store: Arc<dyn VectorStore>,
    pub indexer: BatchIndexer,
}

pub struct ServiceFactory {
    config: Config,
    progress: Arc<dyn ProgressSink>,
}

impl ServiceFactory {
    #[inline]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            progress: Arc::new(SilentProgress),
        }
    }

    /// Report native dependency installation through `progress`
    #[inline]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Configured model, or the provider's default
    #[inline]
    pub fn model_id(&self) -> &str {
        self.config
            .embedder
            .model_id()
            .unwrap_or_else(|| default_model_id(self.config.embedder.provider))
    }

    /// Build the embedder for the configured provider
    #[inline]
    pub fn create_embedder(&self) -> Result<Arc<dyn Embedder>> {
        let embedder_config = &self.config.embedder;
        let provider = embedder_config.provider;
        let model = self.model_id();

        let embedder: Arc<dyn Embedder> = match provider {
            EmbedderProvider::OpenAi => {
                let api_key = required_api_key(provider, &embedder_config.openai)?;
                Arc::new(OpenAiCompatibleEmbedder::new(
                    provider,
                    OPENAI_BASE_URL,
                    api_key,
                    model,
                )?)
            }
            EmbedderProvider::Ollama => {
                Arc::new(OllamaEmbedder::new(&embedder_config.ollama, Some(model))?)
            }
            EmbedderProvider::OpenAiCompatible => {
                let settings = &embedder_config.openai_compatible;
                let base_url = required(provider, "base_url", settings.base_url.as_deref())?;
                let api_key = required(provider, "api_key", settings.api_key.as_deref())?;
                Arc::new(OpenAiCompatibleEmbedder::new(
                    provider, base_url, api_key, model,
                )?)
            }
            EmbedderProvider::Gemini => {
                let api_key = required_api_key(provider, &embedder_config.gemini)?;
                Arc::new(OpenAiCompatibleEmbedder::new(
                    provider,
                    GEMINI_BASE_URL,
                    api_key,
                    model,
                )?)
            }
            EmbedderProvider::Mistral => {
                let api_key = required_api_key(provider, &embedder_config.mistral)?;
                Arc::new(OpenAiCompatibleEmbedder::new(
                    provider,
                    MISTRAL_BASE_URL,
                    api_key,
                    model,
                )?)
            }
        };

        debug!("Created {} embedder for model {}", provider, model);
        Ok(embedder)
    }

    /// Check that the embedder can reach its server with the configured model
    #[inline]
    pub async fn validate_embedder(&self, embedder: &dyn Embedder) -> ValidationResult {
        embedder.validate_configuration().await
    }

    /// Vector width from the model profile table, else the manual override
    #[inline]
    pub fn vector_dimension(&self) -> Result<usize> {
        let provider = self.config.embedder.provider;
        let model = self.model_id();

        get_model_dimension(provider, model)
            .or_else(|| self.config.embedder.dimension.map(|d| d as usize))
            .ok_or_else(|| {
                ConfigError::UndeterminedDimension {
                    provider: provider.to_string(),
                    model: model.to_string(),
                }
                .into()
            })
    }

    /// Build the configured vector store for `workspace_path`
    ///
    /// The embedded backend installs its native driver first if it is missing.
    /// The store is returned uninitialized.
    #[inline]
    pub async fn create_vector_store(&self, workspace_path: &Path) -> Result<Arc<dyn VectorStore>> {
        self.build_vector_store(workspace_path, true).await
    }

    /// Like [`Self::create_vector_store`], but never installs anything
    ///
    /// A missing native driver is a `Dependency` error.
    #[inline]
    pub async fn open_vector_store(&self, workspace_path: &Path) -> Result<Arc<dyn VectorStore>> {
        self.build_vector_store(workspace_path, false).await
    }

    async fn build_vector_store(
        &self,
        workspace_path: &Path,
        install: bool,
    ) -> Result<Arc<dyn VectorStore>> {
        let vector_size = self.vector_dimension()?;
        let store_config = &self.config.vector_store;

        let store: Arc<dyn VectorStore> = match store_config.backend {
            VectorStoreBackend::Lancedb => {
                let dependencies = DependencyManager::from_config(&self.config)?;
                if install {
                    dependencies.ensure_available(self.progress.as_ref()).await?;
                } else if !dependencies.check_binaries() {
                    return Err(CodeIndexError::Dependency(format!(
                        "Native LanceDB driver is not installed in {}, run 'code-index deps --install'",
                        dependencies.deps_dir().display()
                    )));
                }

                let driver = Arc::new(LanceDriver::with_module_path(dependencies.module_path()));
                let store = LanceVectorStore::new(
                    driver,
                    workspace_path,
                    &self.config.vector_database_root(),
                    vector_size,
                );
                info!("Using LanceDB vector store at {:?}", store.db_path());
                Arc::new(store)
            }
            VectorStoreBackend::Qdrant => {
                let url = required_setting(
                    "qdrant",
                    "qdrant_url",
                    store_config.qdrant_url.as_deref(),
                )?;
                let store = QdrantVectorStore::new(
                    url,
                    store_config.qdrant_api_key.as_deref(),
                    workspace_path,
                    vector_size,
                )?;
                info!("Using Qdrant collection {} at {}", store.collection(), url);
                Arc::new(store)
            }
        };

        Ok(store)
    }

    /// Batch indexer carrying the configured batch size and retry count
    #[inline]
    pub fn create_indexer(
        &self,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
    ) -> BatchIndexer {
        BatchIndexer::new(
            embedder,
            vector_store,
            self.config.indexing.batch_size,
            self.config.indexing.max_retries,
        )
    }

    #[inline]
    pub async fn create_services(&self, workspace_path: &Path) -> Result<IndexingServices> {
        let embedder = self.create_embedder()?;
        let vector_store = self.create_vector_store(workspace_path).await?;
        let indexer = self.create_indexer(Arc::clone(&embedder), Arc::clone(&vector_store));

        Ok(IndexingServices {
            embedder,
            vector_store,
            indexer,
        })
    }
}

fn required_setting<'a>(
    provider: &str,
    field: &'static str,
    value: Option<&'a str>,
) -> std::result::Result<&'a str, ConfigError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingProviderSetting {
            provider: provider.to_string(),
            field,
        })
}

fn required<'a>(
    provider: EmbedderProvider,
    field: &'static str,
    value: Option<&'a str>,
) -> std::result::Result<&'a str, ConfigError> {
    required_setting(provider.as_str(), field, value)
}

fn required_api_key(
    provider: EmbedderProvider,
    settings: &ApiKeyConfig,
) -> std::result::Result<&str, ConfigError> {
    required(provider, "api_key", settings.api_key.as_deref())
}
