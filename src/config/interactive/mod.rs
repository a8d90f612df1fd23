
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};
use std::path::Path;

use super::{Config, EmbedderConfig, OllamaConfig, VectorStoreBackend, VectorStoreConfig};
use crate::embeddings::EmbedderProvider;
use crate::embeddings::models::default_model_id;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Code Index Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Embedder Configuration").bold().yellow());
    eprintln!("Choose the provider that turns code chunks into vectors.");
    eprintln!();

    configure_embedder(&mut config.embedder)?;

    eprintln!();
    eprintln!("{}", style("Vector Store Configuration").bold().yellow());
    configure_vector_store(&mut config.vector_store)?;

    if config.embedder.provider == EmbedderProvider::Ollama {
        eprintln!();
        eprintln!("{}", style("Testing Ollama connection...").yellow());

        if test_ollama_connection(&config.embedder.ollama) {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before indexing.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedder Settings:").bold().yellow());
    eprintln!("  Provider: {}", style(config.embedder.provider).cyan());
    eprintln!(
        "  Model: {}",
        style(
            config
                .embedder
                .model_id()
                .unwrap_or_else(|| default_model_id(config.embedder.provider))
        )
        .cyan()
    );
    match config.embedder.dimension {
        Some(dimension) => eprintln!("  Dimension override: {}", style(dimension).cyan()),
        None => eprintln!("  Dimension override: {}", style("none").dim()),
    }
    if config.embedder.provider == EmbedderProvider::Ollama {
        match config.embedder.ollama.ollama_url() {
            Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
            Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
        }
    }

    eprintln!();
    eprintln!("{}", style("Vector Store Settings:").bold().yellow());
    eprintln!("  Backend: {}", style(config.vector_store.backend).cyan());
    match config.vector_store.backend {
        VectorStoreBackend::Lancedb => eprintln!(
            "  Database root: {}",
            style(config.vector_database_root().display()).cyan()
        ),
        VectorStoreBackend::Qdrant => eprintln!(
            "  Qdrant URL: {}",
            style(config.vector_store.qdrant_url.as_deref().unwrap_or("<unset>")).cyan()
        ),
    }

    eprintln!();
    eprintln!("{}", style("Indexing Settings:").bold().yellow());
    eprintln!("  Batch Size: {}", style(config.indexing.batch_size).cyan());
    eprintln!("  Max Retries: {}", style(config.indexing.max_retries).cyan());
    eprintln!(
        "  Search: min score {}, max results {}",
        style(config.indexing.search_min_score).cyan(),
        style(config.indexing.search_max_results).cyan()
    );

    eprintln!();
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).unwrap_or_else(|_| {
        eprintln!(
            "{}",
            style("No valid configuration found. Using defaults.").yellow()
        );
        Config {
            base_dir: config_dir.to_path_buf(),
            ..Config::default()
        }
    })
}

fn configure_embedder(embedder: &mut EmbedderConfig) -> Result<()> {
    let providers = EmbedderProvider::ALL;
    let default_index = providers
        .iter()
        .position(|&p| p == embedder.provider)
        .unwrap_or(0);

    let provider_index = Select::new()
        .with_prompt("Embedding provider")
        .default(default_index)
        .items(providers)
        .interact()?;
    let provider = providers[provider_index];
    embedder.provider = provider;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(
            embedder
                .model_id()
                .unwrap_or_else(|| default_model_id(provider))
                .to_string(),
        )
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    embedder.model_id = Some(model);

    match provider {
        EmbedderProvider::Ollama => configure_ollama(&mut embedder.ollama)?,
        EmbedderProvider::OpenAi => embedder.openai.api_key = Some(prompt_api_key("OpenAI")?),
        EmbedderProvider::OpenAiCompatible => {
            let base_url: String = Input::new()
                .with_prompt("Base URL")
                .with_initial_text(
                    embedder
                        .openai_compatible
                        .base_url
                        .clone()
                        .unwrap_or_default(),
                )
                .validate_with(|input: &String| -> Result<(), String> {
                    url::Url::parse(input)
                        .map(|_| ())
                        .map_err(|e| format!("Invalid URL: {e}"))
                })
                .interact_text()?;
            embedder.openai_compatible.base_url = Some(base_url);
            embedder.openai_compatible.api_key = Some(prompt_api_key("OpenAI-compatible")?);
        }
        EmbedderProvider::Gemini => embedder.gemini.api_key = Some(prompt_api_key("Gemini")?),
        EmbedderProvider::Mistral => embedder.mistral.api_key = Some(prompt_api_key("Mistral")?),
    }

    Ok(())
}

fn prompt_api_key(provider: &str) -> Result<String> {
    Ok(Password::new()
        .with_prompt(format!("{provider} API key"))
        .interact()?)
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocols[protocol_index].to_string())?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;

    Ok(())
}

fn configure_vector_store(store: &mut VectorStoreConfig) -> Result<()> {
    let backends = [VectorStoreBackend::Lancedb, VectorStoreBackend::Qdrant];
    let default_index = backends
        .iter()
        .position(|&b| b == store.backend)
        .unwrap_or(0);

    let backend_index = Select::new()
        .with_prompt("Vector store backend")
        .default(default_index)
        .items(&backends)
        .interact()?;
    store.backend = backends[backend_index];

    if store.backend == VectorStoreBackend::Qdrant {
        let url: String = Input::new()
            .with_prompt("Qdrant URL")
            .default(
                store
                    .qdrant_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:6333".to_string()),
            )
            .interact_text()?;
        store.qdrant_url = Some(url);

        let api_key: String = Input::new()
            .with_prompt("Qdrant API key (leave empty for none)")
            .allow_empty(true)
            .interact_text()?;
        store.qdrant_api_key = (!api_key.trim().is_empty()).then_some(api_key);
    }

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) => (400..500).contains(&code),
        Err(_) => false,
    }
}
