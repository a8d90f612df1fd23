// Qdrant vector store
// Same contract as the embedded store, backed by a Qdrant server over its REST API


use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::{
    ChunkPayload, DEFAULT_MAX_SEARCH_RESULTS, DEFAULT_SEARCH_MIN_SCORE, Point, SearchResult,
    VectorStore, directory_prefix, workspace_relative_path,
};
use crate::config::ConfigError;
use crate::embeddings::http::{HttpClient, status_of};
use crate::{CodeIndexError, Result};

/// Payload key holding the split path used for directory filtering
pub const PATH_SEGMENTS_KEY: &str = "pathSegments";
/// Number of leading path segments that get a keyword index
const INDEXED_PATH_SEGMENTS: usize = 5;
/// Name hashed into the id of the point carrying the indexing flag
pub const METADATA_POINT_NAME: &str = "__indexing_metadata__";

/// Collection name for a workspace: `ws-<sha256(path)[..16]>`
#[inline]
pub fn collection_name(workspace_path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workspace_path.to_string_lossy().as_bytes());
    let hash_hex = format!("{:x}", hasher.finalize());
    format!("ws-{}", &hash_hex[..16])
}

/// Qdrant point id for a caller-assigned id: UUIDs are kept, anything else maps to a UUIDv5
#[inline]
pub fn point_uuid(id: &str) -> Uuid {
    Uuid::parse_str(id).unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()))
}

pub struct QdrantVectorStore {
    http: HttpClient,
    base_url: String,
    collection_name: String,
    workspace_path: PathBuf,
    vector_size: usize,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct RetrievedPoint {
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl QdrantVectorStore {
    #[inline]
    pub fn new(
        url: &str,
        api_key: Option<&str>,
        workspace_path: impl Into<PathBuf>,
        vector_size: usize,
    ) -> Result<Self> {
        Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;

        let mut http = HttpClient::default();
        if let Some(api_key) = api_key {
            http = http.with_header("api-key", api_key);
        }

        let workspace_path = workspace_path.into();
        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
            collection_name: collection_name(&workspace_path),
            workspace_path,
            vector_size,
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection_name
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.base_url, self.collection_name, suffix
        )
    }

    async fn call<T, F>(&self, request: F) -> anyhow::Result<T>
    where
        F: FnOnce(&HttpClient) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let http = self.http.clone();
        tokio::task::spawn_blocking(move || request(&http))
            .await
            .context("Qdrant request task failed")?
    }

    async fn get_json(&self, url: String) -> anyhow::Result<Value> {
        self.call(move |http| {
            let body = http.get(&url)?;
            serde_json::from_str(&body).context("Failed to parse Qdrant response")
        })
        .await
    }

    async fn send_json(&self, method: JsonMethod, url: String, body: Value) -> anyhow::Result<Value> {
        self.call(move |http| {
            let body = body.to_string();
            let response = match method {
                JsonMethod::Post => http.post_json(&url, &body)?,
                JsonMethod::Put => http.put_json(&url, &body)?,
            };
            serde_json::from_str(&response).context("Failed to parse Qdrant response")
        })
        .await
    }

    /// Stored vector size, or `None` when the collection does not exist
    async fn existing_vector_size(&self) -> anyhow::Result<Option<Option<usize>>> {
        match self.get_json(self.collection_url("")).await {
            Ok(info) => Ok(Some(
                info.pointer("/result/config/params/vectors/size")
                    .and_then(Value::as_u64)
                    .and_then(|size| usize::try_from(size).ok()),
            )),
            Err(e) if status_of(&e) == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_collection(&self) -> anyhow::Result<()> {
        self.send_json(
            JsonMethod::Put,
            self.collection_url(""),
            json!({
                "vectors": {"size": self.vector_size, "distance": "Cosine"},
            }),
        )
        .await
        .context("Failed to create collection")?;

        for segment in 0..INDEXED_PATH_SEGMENTS {
            let field_name = format!("{}.{}", PATH_SEGMENTS_KEY, segment);
            if let Err(e) = self
                .send_json(
                    JsonMethod::Put,
                    self.collection_url("/index?wait=true"),
                    json!({"field_name": field_name, "field_schema": "keyword"}),
                )
                .await
            {
                warn!("Failed to create payload index on {}: {:#}", field_name, e);
            }
        }

        info!("Created Qdrant collection {}", self.collection_name);
        Ok(())
    }

    async fn delete_collection_request(&self) -> anyhow::Result<()> {
        let url = self.collection_url("");
        self.call(move |http| http.delete(&url).map(|_| ()))
            .await
    }

    async fn try_initialize(&self) -> anyhow::Result<bool> {
        match self.existing_vector_size().await? {
            None => {
                self.create_collection().await?;
                Ok(true)
            }
            Some(size) if size != Some(self.vector_size) => {
                warn!(
                    "Collection {} has vector size {:?}, expected {}, recreating",
                    self.collection_name, size, self.vector_size
                );
                self.delete_collection_request().await?;
                self.create_collection().await?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn set_indexing_flag(&self, complete: bool) -> Result<()> {
        let metadata = json!({
            "id": point_uuid(METADATA_POINT_NAME).to_string(),
            "vector": vec![0.0_f32; self.vector_size],
            "payload": {"type": "metadata", "indexing_complete": complete},
        });

        self.send_json(
            JsonMethod::Put,
            self.collection_url("/points?wait=true"),
            json!({"points": [metadata]}),
        )
        .await
        .map(|_| ())
        .map_err(database_error("Failed to update indexing metadata"))
    }

    async fn try_has_indexed_data(&self) -> anyhow::Result<bool> {
        if self.existing_vector_size().await?.is_none() {
            return Ok(false);
        }

        let count: QdrantResponse<CountResult> = serde_json::from_value(
            self.send_json(
                JsonMethod::Post,
                self.collection_url("/points/count"),
                json!({"exact": true, "filter": exclude_metadata()}),
            )
            .await?,
        )?;
        if count.result.count == 0 {
            return Ok(false);
        }

        let url = self.collection_url(&format!("/points/{}", point_uuid(METADATA_POINT_NAME)));
        let metadata = match self.get_json(url).await {
            Ok(value) => serde_json::from_value::<QdrantResponse<RetrievedPoint>>(value)?,
            Err(e) if status_of(&e) == Some(404) => return Ok(false),
            Err(e) => return Err(e),
        };

        Ok(metadata
            .result
            .payload
            .and_then(|payload| payload.get("indexing_complete").and_then(Value::as_bool))
            .unwrap_or(false))
    }
}

#[derive(Debug, Clone, Copy)]
enum JsonMethod {
    Post,
    Put,
}

fn database_error(context: &'static str) -> impl Fn(anyhow::Error) -> CodeIndexError {
    move |e| CodeIndexError::Database(format!("{}: {:#}", context, e))
}

fn exclude_metadata() -> Value {
    json!({"must_not": [{"key": "type", "match": {"value": "metadata"}}]})
}

fn path_segments(file_path: &str) -> Map<String, Value> {
    file_path
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .enumerate()
        .map(|(index, segment)| (index.to_string(), Value::String(segment.to_string())))
        .collect()
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn initialize(&self) -> Result<bool> {
        self.try_initialize().await.map_err(|e| {
            error!("Failed to initialize Qdrant vector store: {:#}", e);
            CodeIndexError::Database(format!("Failed to initialize Qdrant vector store: {:#}", e))
        })
    }

    async fn upsert_points(&self, points: Vec<Point>) -> Result<()> {
        let points: Vec<Value> = points
            .into_iter()
            .filter_map(|point| {
                let Some(payload) = point.chunk_payload() else {
                    debug!("Skipping point {} with invalid payload", point.id);
                    return None;
                };
                let segments = path_segments(&payload.file_path);
                let mut payload = payload.into_map();
                payload.insert(PATH_SEGMENTS_KEY.to_string(), Value::Object(segments));

                Some(json!({
                    "id": point_uuid(&point.id).to_string(),
                    "vector": point.vector,
                    "payload": payload,
                }))
            })
            .collect();

        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        self.send_json(
            JsonMethod::Put,
            self.collection_url("/points?wait=true"),
            json!({"points": points}),
        )
        .await
        .map_err(database_error("Failed to upsert points"))?;

        debug!("Upserted {} points", count);
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        directory_prefix_filter: Option<&str>,
        min_score: Option<f32>,
        max_results: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let mut filter = exclude_metadata();
        if let Some(prefix) = directory_prefix_filter.and_then(directory_prefix) {
            let must: Vec<Value> = path_segments(prefix)
                .into_iter()
                .map(|(index, segment)| {
                    json!({
                        "key": format!("{}.{}", PATH_SEGMENTS_KEY, index),
                        "match": {"value": segment},
                    })
                })
                .collect();
            filter["must"] = Value::Array(must);
        }

        let body = json!({
            "vector": query_vector,
            "filter": filter,
            "limit": max_results.unwrap_or(DEFAULT_MAX_SEARCH_RESULTS),
            "score_threshold": min_score.unwrap_or(DEFAULT_SEARCH_MIN_SCORE),
            "with_payload": true,
        });

        let response = self
            .send_json(
                JsonMethod::Post,
                self.collection_url("/points/search"),
                body,
            )
            .await
            .and_then(|value| {
                serde_json::from_value::<QdrantResponse<Vec<ScoredPoint>>>(value)
                    .context("Failed to parse search results")
            })
            .map_err(database_error("Failed to search points"))
            .inspect_err(|e| error!("Vector search failed: {}", e))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = ChunkPayload::from_map(point.payload.as_ref()?)?;
                let id = match point.id {
                    Value::String(id) => id,
                    other => other.to_string(),
                };
                Some(SearchResult {
                    id,
                    score: point.score,
                    payload,
                })
            })
            .collect())
    }

    async fn delete_points_by_multiple_file_paths(&self, file_paths: &[String]) -> Result<()> {
        if file_paths.is_empty() {
            return Ok(());
        }

        let relative: Vec<String> = file_paths
            .iter()
            .map(|path| workspace_relative_path(&self.workspace_path, path))
            .collect();

        self.send_json(
            JsonMethod::Post,
            self.collection_url("/points/delete?wait=true"),
            json!({"filter": {"must": [{"key": "filePath", "match": {"any": relative}}]}}),
        )
        .await
        .map_err(database_error("Failed to delete points"))?;

        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        match self.delete_collection_request().await {
            Ok(()) => Ok(()),
            Err(e) if status_of(&e) == Some(404) => Ok(()),
            Err(e) => Err(database_error("Failed to delete collection")(e)),
        }
    }

    async fn clear_collection(&self) -> Result<()> {
        self.send_json(
            JsonMethod::Post,
            self.collection_url("/points/delete?wait=true"),
            json!({"filter": {"must": []}}),
        )
        .await
        .map_err(database_error("Failed to clear collection"))?;

        info!("Cleared Qdrant collection {}", self.collection_name);
        Ok(())
    }

    async fn collection_exists(&self) -> bool {
        match self.existing_vector_size().await {
            Ok(size) => size.is_some(),
            Err(e) => {
                warn!("Failed to check for collection: {:#}", e);
                false
            }
        }
    }

    async fn has_indexed_data(&self) -> bool {
        self.try_has_indexed_data().await.unwrap_or_else(|e| {
            warn!("Failed to check for indexed data: {:#}", e);
            false
        })
    }

    async fn mark_indexing_complete(&self) -> Result<()> {
        self.set_indexing_flag(true).await
    }

    async fn mark_indexing_incomplete(&self) -> Result<()> {
        self.set_indexing_flag(false).await
    }
}
