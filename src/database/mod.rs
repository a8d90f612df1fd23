// Database module
// Vector store contract shared by the embedded LanceDB engine and the remote Qdrant backend

#[cfg(test)]
mod tests;

pub mod lancedb;
pub mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};

use crate::Result;

/// Minimum similarity score applied when a search does not specify one
pub const DEFAULT_SEARCH_MIN_SCORE: f32 = 0.4;
/// Result cap applied when a search does not specify one
pub const DEFAULT_MAX_SEARCH_RESULTS: usize = 50;

/// One indexed unit: a caller-assigned id, its embedding and the chunk payload
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    /// Loosely typed so that points from any producer can be validated on upsert
    pub payload: Map<String, Value>,
}

/// Typed view of a point payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub file_path: String,
    pub code_chunk: String,
    pub start_line: i64,
    pub end_line: i64,
}

/// A nearest-neighbor hit, `score = 1 - cosine distance`
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

impl Point {
    #[inline]
    pub fn new(id: impl Into<String>, vector: Vec<f32>, payload: ChunkPayload) -> Self {
        Self {
            id: id.into(),
            vector,
            payload: payload.into_map(),
        }
    }

    /// The typed payload, or `None` when the point must be skipped
    #[inline]
    pub fn chunk_payload(&self) -> Option<ChunkPayload> {
        ChunkPayload::from_map(&self.payload)
    }
}

impl ChunkPayload {
    /// Keys that must all be present for a point to be stored
    pub const REQUIRED_KEYS: [&'static str; 4] = ["filePath", "codeChunk", "startLine", "endLine"];

    /// Presence of every required key decides validity; values are then coerced
    /// into their column types and any value that cannot be coerced also rejects the payload.
    #[inline]
    pub fn from_map(map: &Map<String, Value>) -> Option<Self> {
        if !Self::REQUIRED_KEYS.iter().all(|key| map.contains_key(*key)) {
            return None;
        }

        Some(Self {
            file_path: coerce_string(&map["filePath"])?,
            code_chunk: coerce_string(&map["codeChunk"])?,
            start_line: coerce_line(&map["startLine"])?,
            end_line: coerce_line(&map["endLine"])?,
        })
    }

    #[inline]
    pub fn into_map(self) -> Map<String, Value> {
        let mut map = Map::with_capacity(4);
        map.insert("filePath".to_string(), Value::String(self.file_path));
        map.insert("codeChunk".to_string(), Value::String(self.code_chunk));
        map.insert("startLine".to_string(), Value::from(self.start_line));
        map.insert("endLine".to_string(), Value::from(self.end_line));
        map
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn coerce_line(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Workspace-relative, lexically normalized form of a file path
///
/// Absolute paths under `workspace_path` lose that prefix, `.` components are
/// dropped and `..` is resolved against the preceding component. The result
/// uses the platform's separator.
#[inline]
pub fn workspace_relative_path(workspace_path: &Path, file_path: &str) -> String {
    let path = Path::new(file_path);
    let relative = if path.is_absolute() {
        path.strip_prefix(workspace_path).unwrap_or(path)
    } else {
        path
    };

    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(normalized.components().next_back(), Some(Component::Normal(_))) {
                    normalized.pop();
                } else {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    normalized.to_string_lossy().into_owned()
}

/// Directory prefix to filter a search on
///
/// A leading `./` is stripped; `None` when the prefix selects the whole workspace.
#[inline]
pub fn directory_prefix(prefix: &str) -> Option<&str> {
    let prefix = prefix.strip_prefix("./").unwrap_or(prefix);
    (!prefix.is_empty() && prefix != ".").then_some(prefix)
}

/// Storage contract consumed by scanners, watchers and the batch indexer
///
/// Every operation may suspend on driver I/O. Implementations perform no retries;
/// callers decide retry and skip policy.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create or open the collection, rebuilding it when the stored vector width
    /// differs from the configured one. Returns `true` when a fresh collection was created.
    async fn initialize(&self) -> Result<bool>;

    /// Delete-then-insert by id. Points with invalid payloads are skipped.
    async fn upsert_points(&self, points: Vec<Point>) -> Result<()>;

    async fn search(
        &self,
        query_vector: &[f32],
        directory_prefix: Option<&str>,
        min_score: Option<f32>,
        max_results: Option<usize>,
    ) -> Result<Vec<SearchResult>>;

    async fn delete_points_by_file_path(&self, file_path: &str) -> Result<()> {
        self.delete_points_by_multiple_file_paths(&[file_path.to_string()])
            .await
    }

    async fn delete_points_by_multiple_file_paths(&self, file_paths: &[String]) -> Result<()>;

    /// Remove the whole collection
    async fn delete_collection(&self) -> Result<()>;

    /// Remove every point but keep the collection
    async fn clear_collection(&self) -> Result<()>;

    /// Errors are logged and reported as `false`
    async fn collection_exists(&self) -> bool;

    /// True when the collection holds points and the last indexing pass completed.
    /// Errors are logged and reported as `false`.
    async fn has_indexed_data(&self) -> bool;

    async fn mark_indexing_complete(&self) -> Result<()>;

    async fn mark_indexing_incomplete(&self) -> Result<()>;
}
