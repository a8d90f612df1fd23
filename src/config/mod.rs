// Configuration management module
// TOML-backed settings for embedders, vector stores, indexing and native dependencies

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ApiKeyConfig, Config, ConfigError, DependencyConfig, EmbedderConfig, IndexingConfig,
    OllamaConfig, OpenAiCompatibleConfig, VectorStoreBackend, VectorStoreConfig,
};
