#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Factory-built services against mocked Ollama and Qdrant servers
use code_index::config::{Config, VectorStoreBackend};
use code_index::database::qdrant::{METADATA_POINT_NAME, collection_name, point_uuid};
use code_index::factory::ServiceFactory;
use code_index::indexer::CodeBlock;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, dir: &TempDir) -> Config {
    let address = server.address();
    let mut config = Config {
        base_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    config.embedder.model_id = Some("all-minilm".to_string());
    config.embedder.ollama.host = address.ip().to_string();
    config.embedder.ollama.port = address.port();
    config.vector_store.backend = VectorStoreBackend::Qdrant;
    config.vector_store.qdrant_url = Some(server.uri());
    config.indexing.batch_size = 2;
    config
}

fn points_path(workspace: &Path) -> String {
    format!("/collections/{}/points", collection_name(workspace))
}

fn flag_body(complete: bool) -> serde_json::Value {
    json!({
        "points": [{
            "id": point_uuid(METADATA_POINT_NAME).to_string(),
            "payload": {"type": "metadata", "indexing_complete": complete},
        }],
    })
}

fn embed_response(count: usize) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "embeddings": vec![vec![0.25_f32; 384]; count],
    }))
}

#[tokio::test]
async fn full_pass_embeds_upserts_and_flags_completion() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("temp dir");
    let workspace = Path::new("/projects/service");

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "all-minilm"})))
        .respond_with(embed_response(2))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(embed_response(1))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(points_path(workspace)))
        .and(body_partial_json(flag_body(false)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(points_path(workspace)))
        .and(body_partial_json(flag_body(true)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(points_path(workspace)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
        .expect(2)
        .mount(&server)
        .await;

    let services = ServiceFactory::new(config_for(&server, &dir))
        .create_services(workspace)
        .await
        .expect("services should be built");

    let stats = services
        .indexer
        .run_full_pass(vec![
            CodeBlock::new("src/main.rs", "fn main() { serve() }", 1, 1),
            CodeBlock::new("src/serve.rs", "pub fn serve() {}", 1, 1),
            CodeBlock::new("src/lib.rs", "pub mod serve;", 1, 1),
        ])
        .await
        .expect("full pass should succeed");

    assert_eq!(stats.blocks_indexed, 3);
    assert_eq!(stats.batches_processed, 2);
}

#[tokio::test]
async fn rejected_embedder_fails_validation() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "nomic-embed-text:latest"}],
        })))
        .mount(&server)
        .await;

    let factory = ServiceFactory::new(config_for(&server, &dir));
    let embedder = factory.create_embedder().expect("embedder should be built");
    let validation = factory.validate_embedder(embedder.as_ref()).await;

    assert!(!validation.valid);
    assert!(
        validation
            .error
            .expect("error should be set")
            .contains("all-minilm")
    );
}
