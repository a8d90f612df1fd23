use super::*;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn embedder_for(server: &MockServer, model: Option<&str>) -> OllamaEmbedder {
    let address = server.address();
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: address.ip().to_string(),
        port: address.port(),
    };
    OllamaEmbedder::new(&config, model)
        .expect("should create embedder")
        .with_http_client(HttpClient::default().with_backoff(Duration::from_millis(10)))
}

#[test]
fn defaults_to_nomic_embed_text() {
    let embedder = OllamaEmbedder::new(&OllamaConfig::default(), None).expect("should create");

    assert_eq!(embedder.model(), "nomic-embed-text");
    assert_eq!(embedder.base_url().as_str(), "http://localhost:11434/");
    assert_eq!(embedder.provider(), EmbedderProvider::Ollama);
}

#[test]
fn model_matching_ignores_latest_tag() {
    let embedder = OllamaEmbedder::new(&OllamaConfig::default(), Some("nomic-embed-text"))
        .expect("should create");
    assert!(embedder.matches_model("nomic-embed-text:latest"));
    assert!(embedder.matches_model("nomic-embed-text"));
    assert!(!embedder.matches_model("nomic-embed-code:latest"));

    let tagged = OllamaEmbedder::new(&OllamaConfig::default(), Some("all-minilm:l6"))
        .expect("should create");
    assert!(!tagged.matches_model("all-minilm:latest"));
}

#[tokio::test]
async fn create_embeddings_posts_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_json(json!({
            "model": "nomic-embed-text",
            "input": ["fn a() {}", "fn b() {}"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2], [0.3, 0.4]],
        })))
        .mount(&server)
        .await;

    let embedder = embedder_for(&server, None);
    let vectors = embedder
        .create_embeddings(&["fn a() {}".to_string(), "fn b() {}".to_string()])
        .await
        .expect("should embed");

    assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
}

#[tokio::test]
async fn empty_input_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let vectors = embedder_for(&server, None)
        .create_embeddings(&[])
        .await
        .expect("should no-op");
    assert!(vectors.is_empty());
}

#[tokio::test]
async fn count_mismatch_is_an_embedding_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2]],
        })))
        .mount(&server)
        .await;

    let result = embedder_for(&server, None)
        .create_embeddings(&["a".to_string(), "b".to_string()])
        .await;

    match result {
        Err(CodeIndexError::Embedding(message)) => assert!(message.contains("Mismatch")),
        other => panic!("expected embedding error, got {other:?}"),
    }
}

#[tokio::test]
async fn validation_checks_installed_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "nomic-embed-text:latest", "size": 274302450}],
        })))
        .mount(&server)
        .await;

    let installed = embedder_for(&server, None).validate_configuration().await;
    assert_eq!(installed, ValidationResult::ok());

    let missing = embedder_for(&server, Some("mxbai-embed-large"))
        .validate_configuration()
        .await;
    assert!(!missing.valid);
    assert!(
        missing
            .error
            .expect("error should be set")
            .contains("mxbai-embed-large")
    );
}
