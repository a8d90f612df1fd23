#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// End-to-end indexing and search against an on-disk LanceDB store
use async_trait::async_trait;
use code_index::Result;
use code_index::database::VectorStore;
use code_index::database::lancedb::{LanceDriver, LanceVectorStore};
use code_index::embeddings::{Embedder, EmbedderProvider, ValidationResult};
use code_index::indexer::{BatchIndexer, CodeBlock};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DIMENSION: usize = 256;

/// Bag-of-words embedder: every token bumps one hashed dimension
struct TokenEmbedder;

impl TokenEmbedder {
    fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; DIMENSION];
        for token in text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in token.to_ascii_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            vector[(hash % DIMENSION as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for TokenEmbedder {
    async fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| Self::embed(text)).collect())
    }

    async fn validate_configuration(&self) -> ValidationResult {
        ValidationResult::ok()
    }

    fn provider(&self) -> EmbedderProvider {
        EmbedderProvider::Ollama
    }
}

fn open_store(db_root: &Path, workspace: &Path, dimension: usize) -> Arc<LanceVectorStore> {
    Arc::new(LanceVectorStore::new(
        Arc::new(LanceDriver::new()),
        workspace,
        db_root,
        dimension,
    ))
}

fn indexer_for(store: &Arc<LanceVectorStore>) -> BatchIndexer {
    let store: Arc<dyn VectorStore> = Arc::<LanceVectorStore>::clone(store);
    BatchIndexer::new(Arc::new(TokenEmbedder), store, 2, 2)
        .with_retry_delay(Duration::from_millis(1))
}

fn workspace_blocks() -> Vec<CodeBlock> {
    vec![
        CodeBlock::new(
            "src/database/pool.rs",
            "pub fn open_database_connection(pool: &Pool) -> Connection { pool.get() }",
            1,
            3,
        ),
        CodeBlock::new(
            "src/database/migrate.rs",
            "pub fn run_schema_migrations(connection: &Connection) { apply(connection) }",
            1,
            5,
        ),
        CodeBlock::new(
            "src/http/router.rs",
            "pub fn build_router() -> Router { Router::new().route(\"/health\", health) }",
            10,
            14,
        ),
        CodeBlock::new(
            "src/http/handlers.rs",
            "async fn health() -> StatusCode { StatusCode::OK }",
            1,
            2,
        ),
        CodeBlock::new(
            "README.md",
            "Run cargo test to execute the suite",
            1,
            1,
        ),
    ]
}

async fn search(store: &LanceVectorStore, query: &str, prefix: Option<&str>) -> Vec<String> {
    store
        .search(&TokenEmbedder::embed(query), prefix, Some(0.0), Some(10))
        .await
        .expect("search should succeed")
        .into_iter()
        .map(|result| result.payload.file_path)
        .collect()
}

#[tokio::test]
async fn full_pass_then_search() {
    let db_root = TempDir::new().expect("db root");
    let workspace = TempDir::new().expect("workspace");
    let store = open_store(db_root.path(), workspace.path(), DIMENSION);
    assert!(store.initialize().await.expect("should create"));

    let stats = indexer_for(&store)
        .run_full_pass(workspace_blocks())
        .await
        .expect("full pass should succeed");

    assert_eq!(stats.blocks_indexed, 5);
    assert_eq!(stats.batches_processed, 3);
    assert!(store.has_indexed_data().await);

    let hits = search(&store, "open database connection pool", None).await;
    assert_eq!(hits.first().map(String::as_str), Some("src/database/pool.rs"));

    let http_only = search(&store, "database connection health", Some("./src/http")).await;
    assert!(!http_only.is_empty());
    assert!(
        http_only.iter().all(|path| path.starts_with("src/http")),
        "{http_only:?}"
    );
}

#[tokio::test]
async fn reindexing_the_same_blocks_does_not_duplicate() {
    let db_root = TempDir::new().expect("db root");
    let workspace = TempDir::new().expect("workspace");
    let store = open_store(db_root.path(), workspace.path(), DIMENSION);
    store.initialize().await.expect("should create");
    let indexer = indexer_for(&store);

    indexer.index_blocks(workspace_blocks()).await;
    indexer.index_blocks(workspace_blocks()).await;

    let hits = search(&store, "open database connection pool", None).await;
    let pool_hits = hits
        .iter()
        .filter(|path| *path == "src/database/pool.rs")
        .count();
    assert_eq!(pool_hits, 1);
}

#[tokio::test]
async fn removed_files_disappear_from_results() {
    let db_root = TempDir::new().expect("db root");
    let workspace = TempDir::new().expect("workspace");
    let store = open_store(db_root.path(), workspace.path(), DIMENSION);
    store.initialize().await.expect("should create");
    let indexer = indexer_for(&store);
    indexer.index_blocks(workspace_blocks()).await;

    let absolute = workspace
        .path()
        .join("src/database/pool.rs")
        .to_string_lossy()
        .into_owned();
    indexer
        .remove_files(&[absolute, "./src/http/../http/router.rs".to_string()])
        .await
        .expect("removal should succeed");

    let hits = search(&store, "open database connection pool router", None).await;
    assert!(!hits.contains(&"src/database/pool.rs".to_string()));
    assert!(!hits.contains(&"src/http/router.rs".to_string()));
    assert!(hits.contains(&"src/database/migrate.rs".to_string()));
}

#[tokio::test]
async fn hostile_paths_are_matched_literally() {
    let db_root = TempDir::new().expect("db root");
    let workspace = TempDir::new().expect("workspace");
    let store = open_store(db_root.path(), workspace.path(), DIMENSION);
    store.initialize().await.expect("should create");
    let indexer = indexer_for(&store);

    indexer
        .index_blocks(vec![
            CodeBlock::new("lib/it's_100%/a.rs", "fn quote_literal() {}", 1, 1),
            CodeBlock::new("lib/itXs_1000/a.rs", "fn quote_literal() {}", 1, 1),
            CodeBlock::new("lib/x') OR ('1'='1.rs", "fn quote_literal() {}", 1, 1),
        ])
        .await;

    let hits = search(&store, "quote literal", Some("lib/it's_100%")).await;
    assert_eq!(hits, vec!["lib/it's_100%/a.rs".to_string()]);

    indexer
        .remove_files(&["lib/x') OR ('1'='1.rs".to_string()])
        .await
        .expect("removal should succeed");

    let mut remaining = search(&store, "quote literal", None).await;
    remaining.sort();
    assert_eq!(
        remaining,
        vec![
            "lib/it's_100%/a.rs".to_string(),
            "lib/itXs_1000/a.rs".to_string()
        ]
    );
}

#[tokio::test]
async fn index_survives_reopen_and_rebuilds_on_new_dimension() {
    let db_root = TempDir::new().expect("db root");
    let workspace = TempDir::new().expect("workspace");

    {
        let store = open_store(db_root.path(), workspace.path(), DIMENSION);
        store.initialize().await.expect("should create");
        indexer_for(&store)
            .run_full_pass(workspace_blocks())
            .await
            .expect("full pass should succeed");
    }

    let reopened = open_store(db_root.path(), workspace.path(), DIMENSION);
    assert!(!reopened.initialize().await.expect("should reopen"));
    assert!(reopened.has_indexed_data().await);

    let resized = open_store(db_root.path(), workspace.path(), DIMENSION / 2);
    assert!(resized.initialize().await.expect("should rebuild"));
    assert!(!resized.has_indexed_data().await);
}

#[tokio::test]
async fn interrupted_pass_is_visible_after_reopen() {
    let db_root = TempDir::new().expect("db root");
    let workspace = TempDir::new().expect("workspace");

    {
        let store = open_store(db_root.path(), workspace.path(), DIMENSION);
        store.initialize().await.expect("should create");
        indexer_for(&store).index_blocks(workspace_blocks()).await;
        store
            .mark_indexing_incomplete()
            .await
            .expect("flag should be written");
    }

    let reopened = open_store(db_root.path(), workspace.path(), DIMENSION);
    reopened.initialize().await.expect("should reopen");
    assert!(!reopened.has_indexed_data().await);
}
