
use super::driver::{DatabaseDriver, DriverConnection, DriverTable, VectorQuery};
use super::{
    CODE_CHUNK_COLUMN, DISTANCE_COLUMN, END_LINE_COLUMN, FILE_PATH_COLUMN, ID_COLUMN,
    INDEXING_COMPLETE_KEY, METADATA_TABLE, METADATA_VALUE_COLUMN, START_LINE_COLUMN,
    VECTOR_SIZE_KEY, VECTOR_TABLE, database_directory_name, metadata_schema, predicate,
    vector_list_size, vector_schema, vector_width,
};
use crate::database::{
    ChunkPayload, DEFAULT_MAX_SEARCH_RESULTS, DEFAULT_SEARCH_MIN_SCORE, Point, SearchResult,
    VectorStore, workspace_relative_path,
};
use crate::{CodeIndexError, Result};
use arrow::array::{Array, FixedSizeListArray, Float32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Id of the throwaway row used to create the vector table with a concrete schema
const SCHEMA_SAMPLE_ID: &str = "__schema_sample__";

/// Embedded per-workspace vector store on top of LanceDB
pub struct LanceVectorStore {
    driver: Arc<dyn DatabaseDriver>,
    workspace_path: PathBuf,
    db_path: PathBuf,
    vector_size: usize,
    session: RwLock<Session>,
}

/// Connection and vector table handle, opened lazily and dropped on close
#[derive(Default)]
struct Session {
    connection: Option<Arc<dyn DriverConnection>>,
    vectors: Option<Arc<dyn DriverTable>>,
}

/// A validated point ready to become a row of the vector table
struct Row {
    id: String,
    vector: Vec<f32>,
    payload: ChunkPayload,
}

impl LanceVectorStore {
    /// Create a store for `workspace_path` under `db_root`
    ///
    /// Nothing is opened until the first operation; call
    /// [`VectorStore::initialize`] before indexing.
    #[inline]
    pub fn new(
        driver: Arc<dyn DatabaseDriver>,
        workspace_path: impl Into<PathBuf>,
        db_root: &Path,
        vector_size: usize,
    ) -> Self {
        let workspace_path = workspace_path.into();
        let db_path = db_root.join(database_directory_name(&workspace_path));

        Self {
            driver,
            workspace_path,
            db_path,
            vector_size,
            session: RwLock::new(Session::default()),
        }
    }

    #[inline]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[inline]
    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    /// Compact the vector table and prune every older version
    ///
    /// Housekeeping only: failures are logged and never returned.
    #[inline]
    pub async fn optimize_table(&self) {
        let result: Result<()> = async {
            let table = self.vector_table().await?;
            table.optimize(chrono::Duration::zero()).await
        }
        .await;

        match result {
            Ok(()) => debug!("Optimized vector table at {:?}", self.db_path),
            Err(e) => warn!("Failed to optimize vector table: {}", e),
        }
    }

    async fn close(&self) {
        let mut session = self.session.write().await;
        *session = Session::default();
    }

    /// Cached connection to a database created by [`VectorStore::initialize`]
    async fn connection(&self) -> Result<Arc<dyn DriverConnection>> {
        let cached = self.session.read().await.connection.as_ref().map(Arc::clone);
        if let Some(connection) = cached {
            return Ok(connection);
        }

        if !self.driver.exists(&self.db_path).await {
            return Err(CodeIndexError::Database(format!(
                "No vector database at {}",
                self.db_path.display()
            )));
        }
        self.open_connection().await
    }

    async fn open_connection(&self) -> Result<Arc<dyn DriverConnection>> {
        let connection = self.driver.connect(&self.db_path).await?;

        let mut session = self.session.write().await;
        Ok(Arc::clone(session.connection.get_or_insert(connection)))
    }

    async fn vector_table(&self) -> Result<Arc<dyn DriverTable>> {
        let cached = self.session.read().await.vectors.as_ref().map(Arc::clone);
        if let Some(table) = cached {
            return Ok(table);
        }

        let table = self.connection().await?.open_table(VECTOR_TABLE).await?;
        Ok(self.cache_vector_table(table).await)
    }

    async fn cache_vector_table(&self, table: Arc<dyn DriverTable>) -> Arc<dyn DriverTable> {
        let mut session = self.session.write().await;
        session.vectors = Some(Arc::clone(&table));
        table
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        self.connection().await?.table_names().await
    }

    async fn try_initialize(&self) -> Result<bool> {
        self.close().await;

        let connection = self.open_connection().await?;
        let tables = connection.table_names().await?;
        let has_metadata = tables.iter().any(|name| name == METADATA_TABLE);

        if !tables.iter().any(|name| name == VECTOR_TABLE) {
            info!("Creating vector tables at {:?}", self.db_path);
            self.create_tables(connection.as_ref(), has_metadata).await?;
            return Ok(true);
        }

        let vectors = connection.open_table(VECTOR_TABLE).await?;
        let stored_size = if has_metadata {
            read_metadata(connection.as_ref(), VECTOR_SIZE_KEY)
                .await?
                .and_then(|value| value.parse::<usize>().ok())
        } else {
            None
        };
        let column_width = vector_width(vectors.schema().await?.as_ref());

        if stored_size != Some(self.vector_size) || column_width != Some(self.vector_size) {
            warn!(
                "Vector size changed (stored {:?}, column {:?}, configured {}), rebuilding tables",
                stored_size, column_width, self.vector_size
            );
            connection.drop_table(VECTOR_TABLE).await?;
            self.create_tables(connection.as_ref(), has_metadata).await?;
            self.optimize_table().await;
            return Ok(true);
        }

        self.cache_vector_table(vectors).await;
        self.optimize_table().await;
        Ok(false)
    }

    /// Create both tables from scratch, dropping a leftover metadata table first
    async fn create_tables(
        &self,
        connection: &dyn DriverConnection,
        drop_stale_metadata: bool,
    ) -> Result<()> {
        if drop_stale_metadata {
            connection.drop_table(METADATA_TABLE).await?;
        }

        let sample = Row {
            id: SCHEMA_SAMPLE_ID.to_string(),
            vector: vec![0.0; self.vector_size],
            payload: ChunkPayload {
                file_path: String::new(),
                code_chunk: String::new(),
                start_line: 0,
                end_line: 0,
            },
        };
        let vectors = connection
            .create_table(VECTOR_TABLE, vector_batch(self.vector_size, &[sample])?)
            .await?;
        vectors
            .delete(&predicate::ids_in([SCHEMA_SAMPLE_ID]))
            .await?;

        let vector_size = self.vector_size.to_string();
        connection
            .create_table(
                METADATA_TABLE,
                metadata_batch(&[
                    (VECTOR_SIZE_KEY, vector_size.as_str()),
                    (INDEXING_COMPLETE_KEY, "false"),
                ])?,
            )
            .await?;

        self.cache_vector_table(vectors).await;
        Ok(())
    }

    async fn write_metadata(&self, key: &str, value: &str) -> Result<()> {
        let connection = self.connection().await?;
        let rows = metadata_batch(&[(key, value)])?;

        if !connection
            .table_names()
            .await?
            .iter()
            .any(|name| name == METADATA_TABLE)
        {
            connection.create_table(METADATA_TABLE, rows).await?;
            return Ok(());
        }

        let table = connection.open_table(METADATA_TABLE).await?;
        table.delete(&predicate::metadata_key_eq(key)).await?;
        table.add(rows).await
    }

    async fn try_has_indexed_data(&self) -> Result<bool> {
        let connection = self.connection().await?;
        let tables = connection.table_names().await?;
        if !tables.iter().any(|name| name == VECTOR_TABLE) {
            return Ok(false);
        }

        if self.vector_table().await?.count_rows(None).await? == 0 {
            return Ok(false);
        }

        if !tables.iter().any(|name| name == METADATA_TABLE) {
            return Ok(false);
        }

        let flag = read_metadata(connection.as_ref(), INDEXING_COMPLETE_KEY).await?;
        Ok(flag.as_deref() == Some("true"))
    }

    async fn drop_tables(&self) -> Result<()> {
        let connection = self.connection().await?;
        for name in connection.table_names().await? {
            if name == VECTOR_TABLE || name == METADATA_TABLE {
                connection.drop_table(&name).await?;
            }
        }
        self.close().await;
        Ok(())
    }

    async fn try_search(&self, query: VectorQuery) -> Result<Vec<SearchResult>> {
        let table = self.vector_table().await?;
        let batches = table.vector_search(query).await?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(parse_search_batch(batch)?);
        }
        Ok(results)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn initialize(&self) -> Result<bool> {
        self.try_initialize().await.map_err(|e| {
            error!("Failed to initialize LanceDB vector store: {}", e);
            CodeIndexError::Database(format!("Failed to initialize LanceDB vector store: {}", e))
        })
    }

    async fn upsert_points(&self, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut rows: Vec<Row> = Vec::with_capacity(points.len());
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(points.len());

        for point in points {
            let Some(payload) = point.chunk_payload() else {
                debug!("Skipping point {} with invalid payload", point.id);
                continue;
            };

            let row = Row {
                id: point.id,
                vector: point.vector,
                payload,
            };
            if let Some(&position) = positions.get(&row.id) {
                rows[position] = row;
            } else {
                positions.insert(row.id.clone(), rows.len());
                rows.push(row);
            }
        }

        if rows.is_empty() {
            debug!("No valid points to upsert");
            return Ok(());
        }

        let batch = vector_batch(self.vector_size, &rows)?;
        let table = self.vector_table().await?;

        table
            .delete(&predicate::ids_in(rows.iter().map(|row| row.id.as_str())))
            .await?;
        table.add(batch).await?;

        debug!("Upserted {} points", rows.len());
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        directory_prefix: Option<&str>,
        min_score: Option<f32>,
        max_results: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let min_score = min_score.unwrap_or(DEFAULT_SEARCH_MIN_SCORE);
        let query = VectorQuery {
            vector: query_vector.to_vec(),
            filter: directory_prefix
                .and_then(crate::database::directory_prefix)
                .map(predicate::file_path_starts_with),
            distance_range: (0.0, 1.0 - min_score),
            limit: max_results.unwrap_or(DEFAULT_MAX_SEARCH_RESULTS),
        };

        self.try_search(query)
            .await
            .inspect(|results| debug!("Search returned {} results", results.len()))
            .inspect_err(|e| error!("Vector search failed: {}", e))
    }

    async fn delete_points_by_multiple_file_paths(&self, file_paths: &[String]) -> Result<()> {
        if file_paths.is_empty() {
            return Ok(());
        }

        let relative: Vec<String> = file_paths
            .iter()
            .map(|path| workspace_relative_path(&self.workspace_path, path))
            .collect();

        let table = self.vector_table().await?;
        table.delete(&predicate::file_paths_in(&relative)).await?;

        debug!("Deleted points for {} file paths", relative.len());
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.close().await;

        let removal = match tokio::fs::remove_dir_all(&self.db_path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        };

        match removal {
            Ok(()) => {
                info!("Deleted vector database at {:?}", self.db_path);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to remove {:?}, dropping tables instead: {}", self.db_path, e);
                self.drop_tables().await.map_err(|drop_err| {
                    error!("Failed to drop tables: {}", drop_err);
                    CodeIndexError::Database(format!("Failed to delete collection: {}", e))
                })
            }
        }
    }

    async fn clear_collection(&self) -> Result<()> {
        self.close().await;

        let table = self.vector_table().await?;
        table.delete("true").await?;

        let cleared: Result<()> = async {
            let connection = self.connection().await?;
            connection
                .open_table(METADATA_TABLE)
                .await?
                .delete("true")
                .await
        }
        .await;
        if let Err(e) = cleared {
            warn!("Failed to clear metadata table: {}", e);
        }

        self.optimize_table().await;
        info!("Cleared vector collection at {:?}", self.db_path);
        Ok(())
    }

    async fn collection_exists(&self) -> bool {
        if !self.driver.exists(&self.db_path).await {
            return false;
        }

        match self.table_names().await {
            Ok(names) => names.iter().any(|name| name == VECTOR_TABLE),
            Err(e) => {
                warn!("Failed to check for vector table: {}", e);
                false
            }
        }
    }

    async fn has_indexed_data(&self) -> bool {
        if !self.driver.exists(&self.db_path).await {
            return false;
        }

        self.try_has_indexed_data().await.unwrap_or_else(|e| {
            warn!("Failed to check for indexed data: {}", e);
            false
        })
    }

    async fn mark_indexing_complete(&self) -> Result<()> {
        self.write_metadata(INDEXING_COMPLETE_KEY, "true").await
    }

    async fn mark_indexing_incomplete(&self) -> Result<()> {
        self.write_metadata(INDEXING_COMPLETE_KEY, "false").await
    }
}

async fn read_metadata(connection: &dyn DriverConnection, key: &str) -> Result<Option<String>> {
    let table = connection.open_table(METADATA_TABLE).await?;
    let batches = table
        .query(Some(predicate::metadata_key_eq(key)), Some(1))
        .await?;

    for batch in &batches {
        let values = column::<StringArray>(batch, METADATA_VALUE_COLUMN)?;
        if !values.is_empty() {
            return Ok(Some(values.value(0).to_string()));
        }
    }
    Ok(None)
}

fn vector_batch(vector_size: usize, rows: &[Row]) -> Result<RecordBatch> {
    let mut flat_values = Vec::with_capacity(rows.len() * vector_size);
    for row in rows {
        if row.vector.len() != vector_size {
            return Err(CodeIndexError::Database(format!(
                "Vector for point {} has {} dimensions, expected {}",
                row.id,
                row.vector.len(),
                vector_size
            )));
        }
        flat_values.extend_from_slice(&row.vector);
    }

    let size = vector_list_size(vector_size)?;
    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_array =
        FixedSizeListArray::try_new(field, size, Arc::new(Float32Array::from(flat_values)), None)
            .map_err(|e| CodeIndexError::Database(format!("Failed to create vector array: {}", e)))?;

    RecordBatch::try_new(
        vector_schema(vector_size)?,
        vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.id))),
            Arc::new(vector_array),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| &r.payload.file_path),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| &r.payload.code_chunk),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.payload.start_line),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.payload.end_line),
            )),
        ],
    )
    .map_err(|e| CodeIndexError::Database(format!("Failed to create record batch: {}", e)))
}

fn metadata_batch(entries: &[(&str, &str)]) -> Result<RecordBatch> {
    RecordBatch::try_new(
        metadata_schema(),
        vec![
            Arc::new(StringArray::from_iter_values(entries.iter().map(|(k, _)| k))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|(_, v)| v))),
        ],
    )
    .map_err(|e| CodeIndexError::Database(format!("Failed to create metadata batch: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| CodeIndexError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| CodeIndexError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let ids = column::<StringArray>(batch, ID_COLUMN)?;
    let file_paths = column::<StringArray>(batch, FILE_PATH_COLUMN)?;
    let code_chunks = column::<StringArray>(batch, CODE_CHUNK_COLUMN)?;
    let start_lines = column::<Int64Array>(batch, START_LINE_COLUMN)?;
    let end_lines = column::<Int64Array>(batch, END_LINE_COLUMN)?;
    let distances = column::<Float32Array>(batch, DISTANCE_COLUMN)?;

    Ok((0..batch.num_rows())
        .map(|row| SearchResult {
            id: ids.value(row).to_string(),
            score: 1.0 - distances.value(row),
            payload: ChunkPayload {
                file_path: file_paths.value(row).to_string(),
                code_chunk: code_chunks.value(row).to_string(),
                start_line: start_lines.value(row),
                end_line: end_lines.value(row),
            },
        })
        .collect())
}
