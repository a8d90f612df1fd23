// Database driver abstraction
// The vector store talks to the engine only through these traits so tests can
// substitute a recording driver for the LanceDB one.


use arrow::array::RecordBatchIterator;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::OptimizeAction;
use lancedb::{Connection, DistanceType, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::VECTOR_COLUMN;
use crate::{CodeIndexError, Result};

/// Nearest-neighbor request handed to a driver table
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    /// SQL predicate applied before the vector search
    pub filter: Option<String>,
    /// Inclusive cosine distance bounds
    pub distance_range: (f32, f32),
    pub limit: usize,
}

/// Opens database connections
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Open the database at `path`, creating it if needed
    async fn connect(&self, path: &Path) -> Result<Arc<dyn DriverConnection>>;

    /// Whether a database has already been created at `path`
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

#[async_trait]
pub trait DriverConnection: Send + Sync {
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Create a table whose schema is taken from the initial rows
    async fn create_table(&self, name: &str, rows: RecordBatch) -> Result<Arc<dyn DriverTable>>;

    async fn open_table(&self, name: &str) -> Result<Arc<dyn DriverTable>>;

    async fn drop_table(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait DriverTable: Send + Sync {
    async fn schema(&self) -> Result<SchemaRef>;

    async fn add(&self, rows: RecordBatch) -> Result<()>;

    async fn delete(&self, predicate: &str) -> Result<()>;

    async fn count_rows(&self, filter: Option<String>) -> Result<usize>;

    async fn query(&self, filter: Option<String>, limit: Option<usize>)
    -> Result<Vec<RecordBatch>>;

    async fn vector_search(&self, query: VectorQuery) -> Result<Vec<RecordBatch>>;

    /// Compact data files and prune versions older than `older_than`
    async fn optimize(&self, older_than: chrono::Duration) -> Result<()>;
}

/// Driver backed by the embedded LanceDB engine
#[derive(Debug, Clone, Default)]
pub struct LanceDriver {
    module_path: Option<PathBuf>,
}

impl LanceDriver {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the provisioned native driver modules before any connection is opened
    #[inline]
    pub fn with_module_path(module_path: impl Into<PathBuf>) -> Self {
        Self {
            module_path: Some(module_path.into()),
        }
    }

    #[inline]
    pub fn module_path(&self) -> Option<&Path> {
        self.module_path.as_deref()
    }
}

#[async_trait]
impl DatabaseDriver for LanceDriver {
    async fn connect(&self, path: &Path) -> Result<Arc<dyn DriverConnection>> {
        if let Some(module_path) = &self.module_path {
            if !module_path.is_dir() {
                return Err(CodeIndexError::Database(format!(
                    "Native LanceDB driver modules not found at {}",
                    module_path.display()
                )));
            }
            debug!("Using native driver modules from {:?}", module_path);
        }

        tokio::fs::create_dir_all(path).await.map_err(|e| {
            CodeIndexError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = path.to_string_lossy();
        debug!("Connecting to LanceDB at {}", uri);

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Arc::new(LanceConnection { connection }))
    }
}

struct LanceConnection {
    connection: Connection,
}

#[async_trait]
impl DriverConnection for LanceConnection {
    async fn table_names(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to list tables: {}", e)))
    }

    async fn create_table(&self, name: &str, rows: RecordBatch) -> Result<Arc<dyn DriverTable>> {
        let schema = rows.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(rows)), schema);

        let table = self
            .connection
            .create_table(name, reader)
            .execute()
            .await
            .map_err(|e| {
                CodeIndexError::Database(format!("Failed to create table {}: {}", name, e))
            })?;

        info!("Created LanceDB table {}", name);
        Ok(Arc::new(LanceTable { table }))
    }

    async fn open_table(&self, name: &str) -> Result<Arc<dyn DriverTable>> {
        let table = self
            .connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to open table {}: {}", name, e)))?;

        Ok(Arc::new(LanceTable { table }))
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        self.connection
            .drop_table(name)
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to drop table {}: {}", name, e)))?;

        info!("Dropped LanceDB table {}", name);
        Ok(())
    }
}

struct LanceTable {
    table: Table,
}

impl LanceTable {
    async fn collect(
        &self,
        stream: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<RecordBatch>> {
        stream.try_collect().await.map_err(|e| {
            CodeIndexError::Database(format!(
                "Failed to read result stream from {}: {}",
                self.table.name(),
                e
            ))
        })
    }
}

#[async_trait]
impl DriverTable for LanceTable {
    async fn schema(&self) -> Result<SchemaRef> {
        self.table
            .schema()
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to get table schema: {}", e)))
    }

    async fn add(&self, rows: RecordBatch) -> Result<()> {
        let schema = rows.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(rows)), schema);

        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to insert rows: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, predicate: &str) -> Result<()> {
        self.table
            .delete(predicate)
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to delete rows: {}", e)))?;

        Ok(())
    }

    async fn count_rows(&self, filter: Option<String>) -> Result<usize> {
        self.table
            .count_rows(filter)
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to count rows: {}", e)))
    }

    async fn query(
        &self,
        filter: Option<String>,
        limit: Option<usize>,
    ) -> Result<Vec<RecordBatch>> {
        let mut query = self.table.query();
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to execute query: {}", e)))?;

        self.collect(stream).await
    }

    async fn vector_search(&self, request: VectorQuery) -> Result<Vec<RecordBatch>> {
        let (lower, upper) = request.distance_range;

        let mut query = self
            .table
            .vector_search(request.vector.as_slice())
            .map_err(|e| CodeIndexError::Database(format!("Failed to create vector search: {}", e)))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::Cosine)
            .distance_range(Some(lower), Some(upper))
            .limit(request.limit);

        if let Some(filter) = request.filter {
            query = query.only_if(filter);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to execute search: {}", e)))?;

        self.collect(stream).await
    }

    async fn optimize(&self, older_than: chrono::Duration) -> Result<()> {
        self.table
            .optimize(OptimizeAction::All)
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to compact table: {}", e)))?;

        self.table
            .optimize(OptimizeAction::Prune {
                older_than: Some(older_than),
                delete_unverified: Some(false),
                error_if_tagged_old_versions: Some(false),
            })
            .await
            .map_err(|e| CodeIndexError::Database(format!("Failed to prune versions: {}", e)))?;

        Ok(())
    }
}
