use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodeIndexError>;

#[derive(Error, Debug)]
pub enum CodeIndexError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unsupported platform: {0}")]
    Platform(String),

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod dependencies;
pub mod embeddings;
pub mod factory;
pub mod indexer;
