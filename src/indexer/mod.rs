// Indexer module
// Batches code blocks through the embedder into the vector store


use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::{ChunkPayload, Point, VectorStore};
use crate::embeddings::Embedder;
use crate::{CodeIndexError, Result};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A contiguous chunk of a source file, as produced by a scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Workspace-relative path of the file
    pub file_path: String,
    pub content: String,
    pub start_line: i64,
    pub end_line: i64,
    /// Hex sha256 of `content`
    pub segment_hash: String,
}

impl CodeBlock {
    #[inline]
    pub fn new(
        file_path: impl Into<String>,
        content: impl Into<String>,
        start_line: i64,
        end_line: i64,
    ) -> Self {
        let content = content.into();
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());

        Self {
            file_path: file_path.into(),
            segment_hash: format!("{:x}", hasher.finalize()),
            content,
            start_line,
            end_line,
        }
    }

    /// Stable id: the same block in the same place always maps to the same point
    #[inline]
    pub fn point_id(&self) -> String {
        let key = format!(
            "{}:{}:{}:{}",
            self.file_path, self.start_line, self.end_line, self.segment_hash
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
    }

    fn into_point(self, vector: Vec<f32>) -> Point {
        let id = self.point_id();
        Point::new(
            id,
            vector,
            ChunkPayload {
                file_path: self.file_path,
                code_chunk: self.content,
                start_line: self.start_line,
                end_line: self.end_line,
            },
        )
    }
}

/// Outcome of an indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub blocks_indexed: usize,
    /// Blocks with blank content
    pub blocks_skipped: usize,
    /// Blocks in batches that failed after every retry
    pub blocks_failed: usize,
    pub batches_processed: usize,
}

impl IndexingStats {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.blocks_failed == 0
    }
}

/// Embeds code blocks in batches and writes them to a vector store
pub struct BatchIndexer {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    batch_size: usize,
    max_retries: u32,
    retry_delay: Duration,
}

impl BatchIndexer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        batch_size: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            batch_size: batch_size.max(1),
            max_retries: max_retries.max(1),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Base delay, doubled after every failed attempt
    #[inline]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[inline]
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed and upsert `blocks`, one batch at a time
    ///
    /// A batch that still fails after the last retry is logged and counted in
    /// [`IndexingStats::blocks_failed`]; the remaining batches are still processed.
    pub async fn index_blocks(&self, blocks: Vec<CodeBlock>) -> IndexingStats {
        let mut stats = IndexingStats::default();

        let (blocks, blank): (Vec<_>, Vec<_>) = blocks
            .into_iter()
            .partition(|block| !block.content.trim().is_empty());
        stats.blocks_skipped = blank.len();

        let mut remaining = blocks.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<CodeBlock> = remaining.by_ref().take(self.batch_size).collect();
            let batch_len = batch.len();

            match self.index_batch(batch).await {
                Ok(()) => {
                    stats.blocks_indexed += batch_len;
                    stats.batches_processed += 1;
                    debug!("Indexed batch of {} blocks", batch_len);
                }
                Err(e) => {
                    stats.blocks_failed += batch_len;
                    error!("Failed to index batch of {} blocks: {}", batch_len, e);
                }
            }
        }

        stats
    }

    /// Index a complete workspace pass bracketed by the indexing-complete flag
    ///
    /// The flag is cleared first and only set again when every batch succeeded.
    pub async fn run_full_pass(&self, blocks: Vec<CodeBlock>) -> Result<IndexingStats> {
        self.vector_store.mark_indexing_incomplete().await?;

        info!("Starting full indexing pass over {} blocks", blocks.len());
        let stats = self.index_blocks(blocks).await;

        if stats.is_complete() {
            self.vector_store.mark_indexing_complete().await?;
            info!(
                "Indexing pass complete: {} indexed, {} skipped",
                stats.blocks_indexed, stats.blocks_skipped
            );
        } else {
            warn!(
                "Indexing pass incomplete: {} of {} blocks failed",
                stats.blocks_failed,
                stats.blocks_failed + stats.blocks_indexed
            );
        }

        Ok(stats)
    }

    /// Drop every point belonging to the given files
    #[inline]
    pub async fn remove_files(&self, file_paths: &[String]) -> Result<()> {
        if file_paths.is_empty() {
            return Ok(());
        }

        debug!("Removing {} files from the index", file_paths.len());
        self.vector_store
            .delete_points_by_multiple_file_paths(file_paths)
            .await
    }

    async fn index_batch(&self, batch: Vec<CodeBlock>) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(|block| block.content.clone()).collect();
        let texts = &texts;
        let embedder = &self.embedder;

        let vectors = self
            .with_retries("embed", || async move {
                let vectors = embedder.create_embeddings(texts).await?;
                if vectors.len() != texts.len() {
                    return Err(CodeIndexError::Embedding(format!(
                        "expected {} embeddings, received {}",
                        texts.len(),
                        vectors.len()
                    )));
                }
                Ok(vectors)
            })
            .await?;

        let points: Vec<Point> = batch
            .into_iter()
            .zip(vectors)
            .map(|(block, vector)| block.into_point(vector))
            .collect();

        let vector_store = &self.vector_store;
        self.with_retries("upsert", || vector_store.upsert_points(points.clone()))
            .await
    }

    async fn with_retries<T, F, Fut>(&self, step: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    let delay = self
                        .retry_delay
                        .saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        step, attempt, self.max_retries, delay, e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
