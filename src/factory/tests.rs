use super::*;
use crate::CodeIndexError;
use crate::dependencies::{LANCEDB_PACKAGE, PINNED_VERSION};
use async_trait::async_trait;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> Config {
    Config {
        base_dir: dir.path().to_path_buf(),
        ..Config::default()
    }
}

fn assert_missing(result: Result<impl Sized>, provider: &str, field: &str) {
    match result {
        Err(CodeIndexError::Config(ConfigError::MissingProviderSetting {
            provider: actual_provider,
            field: actual_field,
        })) => {
            assert_eq!(actual_provider, provider);
            assert_eq!(actual_field, field);
        }
        Err(other) => panic!("expected missing {provider} {field}, got {other}"),
        Ok(_) => panic!("expected missing {provider} {field}, got a service"),
    }
}

/// Lay out an installed driver bundle for the running platform
fn install_fake_driver(config: &Config) {
    let manager = DependencyManager::from_config(config).expect("platform should be supported");
    let modules = manager.module_path();
    let core = modules.join(LANCEDB_PACKAGE);
    std::fs::create_dir_all(core.join("dist")).expect("create core package");
    std::fs::write(
        core.join("package.json"),
        format!(r#"{{"version":"{PINNED_VERSION}"}}"#),
    )
    .expect("write manifest");

    let target = manager.target();
    let platform = modules.join(target.package_name());
    std::fs::create_dir_all(&platform).expect("create platform package");
    std::fs::write(platform.join(target.binary_name()), b"").expect("write binary");
}

struct RejectingEmbedder;

#[async_trait]
impl Embedder for RejectingEmbedder {
    async fn create_embeddings(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(Vec::new())
    }

    async fn validate_configuration(&self) -> ValidationResult {
        ValidationResult::failed("model not pulled")
    }

    fn provider(&self) -> EmbedderProvider {
        EmbedderProvider::Ollama
    }
}

#[test]
fn default_configuration_builds_ollama_embedder() {
    let dir = TempDir::new().expect("temp dir");
    let factory = ServiceFactory::new(config_in(&dir));

    let embedder = factory.create_embedder().expect("ollama needs no credentials");

    assert_eq!(embedder.provider(), EmbedderProvider::Ollama);
    assert_eq!(factory.model_id(), "nomic-embed-text");
}

#[test]
fn keyed_providers_require_api_key() {
    let dir = TempDir::new().expect("temp dir");

    for provider in [
        EmbedderProvider::OpenAi,
        EmbedderProvider::Gemini,
        EmbedderProvider::Mistral,
    ] {
        let mut config = config_in(&dir);
        config.embedder.provider = provider;
        assert_missing(
            ServiceFactory::new(config).create_embedder(),
            provider.as_str(),
            "api_key",
        );
    }
}

#[test]
fn blank_api_key_counts_as_missing() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.embedder.provider = EmbedderProvider::OpenAi;
    config.embedder.openai.api_key = Some("   ".to_string());

    assert_missing(
        ServiceFactory::new(config).create_embedder(),
        "openai",
        "api_key",
    );
}

#[test]
fn openai_compatible_requires_base_url_then_key() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.embedder.provider = EmbedderProvider::OpenAiCompatible;
    config.embedder.openai_compatible.api_key = Some("sk-test".to_string());

    assert_missing(
        ServiceFactory::new(config.clone()).create_embedder(),
        "openai-compatible",
        "base_url",
    );

    config.embedder.openai_compatible.base_url = Some("http://localhost:8080/v1".to_string());
    config.embedder.openai_compatible.api_key = None;
    assert_missing(
        ServiceFactory::new(config).create_embedder(),
        "openai-compatible",
        "api_key",
    );
}

#[test]
fn configured_provider_is_built() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.embedder.provider = EmbedderProvider::Gemini;
    config.embedder.gemini.api_key = Some("key".to_string());

    let embedder = ServiceFactory::new(config)
        .create_embedder()
        .expect("gemini with a key should build");

    assert_eq!(embedder.provider(), EmbedderProvider::Gemini);
}

#[tokio::test]
async fn validation_reports_embedder_result() {
    let dir = TempDir::new().expect("temp dir");
    let factory = ServiceFactory::new(config_in(&dir));

    let result = factory.validate_embedder(&RejectingEmbedder).await;

    assert_eq!(result, ValidationResult::failed("model not pulled"));
}

#[test]
fn dimension_comes_from_profile_before_override() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.embedder.model_id = Some("mxbai-embed-large:latest".to_string());
    config.embedder.dimension = Some(12);

    assert_eq!(
        ServiceFactory::new(config)
            .vector_dimension()
            .expect("known model"),
        1024
    );
}

#[test]
fn unknown_model_uses_override() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.embedder.model_id = Some("my-custom-embedder".to_string());
    config.embedder.dimension = Some(256);

    assert_eq!(
        ServiceFactory::new(config)
            .vector_dimension()
            .expect("override applies"),
        256
    );
}

#[test]
fn unknown_model_without_override_is_undetermined() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.embedder.model_id = Some("my-custom-embedder".to_string());

    let result = ServiceFactory::new(config).vector_dimension();

    assert!(matches!(
        result,
        Err(CodeIndexError::Config(ConfigError::UndeterminedDimension { .. }))
    ));
}

#[tokio::test]
async fn qdrant_requires_url() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.vector_store.backend = VectorStoreBackend::Qdrant;

    let result = ServiceFactory::new(config)
        .create_vector_store(Path::new("/ws"))
        .await;

    assert_missing(result, "qdrant", "qdrant_url");
}

#[tokio::test]
async fn qdrant_store_is_built_without_network() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.vector_store.backend = VectorStoreBackend::Qdrant;
    config.vector_store.qdrant_url = Some("http://localhost:6333".to_string());

    ServiceFactory::new(config)
        .create_vector_store(Path::new("/ws"))
        .await
        .expect("qdrant store should be built lazily");
}

#[tokio::test]
async fn lancedb_store_requires_native_driver() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.dependencies.package_manager = "definitely-not-a-package-manager".to_string();

    let result = ServiceFactory::new(config)
        .create_vector_store(Path::new("/ws"))
        .await;

    assert!(matches!(result, Err(CodeIndexError::Dependency(_))));
}

#[tokio::test]
async fn opening_lancedb_store_never_installs_driver() {
    let dir = TempDir::new().expect("temp dir");
    let config = config_in(&dir);
    let deps_dir = config.dependency_dir();

    let result = ServiceFactory::new(config)
        .open_vector_store(Path::new("/ws"))
        .await;

    assert!(matches!(result, Err(CodeIndexError::Dependency(_))));
    assert!(!deps_dir.join("package.json").exists());
}

#[tokio::test]
async fn opening_lancedb_store_uses_installed_driver() {
    let dir = TempDir::new().expect("temp dir");
    let workspace = TempDir::new().expect("workspace dir");
    let config = config_in(&dir);
    let database_root = config.vector_database_root();
    install_fake_driver(&config);

    let store = ServiceFactory::new(config)
        .open_vector_store(workspace.path())
        .await
        .expect("store should open");

    assert!(!store.collection_exists().await);
    assert!(!database_root.exists());
}

#[tokio::test]
async fn opening_qdrant_store_needs_no_driver() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.vector_store.backend = VectorStoreBackend::Qdrant;
    config.vector_store.qdrant_url = Some("http://localhost:6333".to_string());

    ServiceFactory::new(config)
        .open_vector_store(Path::new("/ws"))
        .await
        .expect("qdrant store should be built lazily");
}

#[tokio::test]
async fn services_share_embedder_and_store() {
    let dir = TempDir::new().expect("temp dir");
    let workspace = TempDir::new().expect("workspace dir");
    let mut config = config_in(&dir);
    config.indexing.batch_size = 7;
    config.indexing.max_retries = 5;
    install_fake_driver(&config);

    let services = ServiceFactory::new(config)
        .create_services(workspace.path())
        .await
        .expect("services should be built");

    assert_eq!(services.indexer.batch_size(), 7);
    assert_eq!(services.indexer.max_retries(), 5);
    assert!(Arc::ptr_eq(services.indexer.embedder(), &services.embedder));
    assert!(Arc::ptr_eq(
        services.indexer.vector_store(),
        &services.vector_store
    ));
}

#[tokio::test]
async fn lancedb_store_opens_under_configured_root() {
    let dir = TempDir::new().expect("temp dir");
    let workspace = TempDir::new().expect("workspace dir");
    let mut config = config_in(&dir);
    config.embedder.model_id = Some("all-minilm".to_string());
    config.vector_store.lancedb_directory = Some(dir.path().join("custom-vectors"));
    install_fake_driver(&config);

    let store = ServiceFactory::new(config)
        .create_vector_store(workspace.path())
        .await
        .expect("store should be built");

    assert!(store.initialize().await.expect("fresh store"));
    let entries: Vec<_> = std::fs::read_dir(dir.path().join("custom-vectors"))
        .expect("database root should exist")
        .collect();
    assert_eq!(entries.len(), 1);
}
