// LanceDB vector database module
// Embedded, per-workspace vector storage with a small key/value metadata table


pub mod driver;
pub mod predicate;
pub mod vector_store;

pub use driver::{DatabaseDriver, DriverConnection, DriverTable, LanceDriver, VectorQuery};
pub use vector_store::LanceVectorStore;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

use crate::{CodeIndexError, Result};

/// Table holding one row per point
pub const VECTOR_TABLE: &str = "vectors";
/// Key/value table holding `vector_size` and `indexing_complete`
pub const METADATA_TABLE: &str = "metadata";

pub const ID_COLUMN: &str = "id";
pub const VECTOR_COLUMN: &str = "vector";
pub const FILE_PATH_COLUMN: &str = "filePath";
pub const CODE_CHUNK_COLUMN: &str = "codeChunk";
pub const START_LINE_COLUMN: &str = "startLine";
pub const END_LINE_COLUMN: &str = "endLine";
/// Column appended by the engine to vector search results
pub const DISTANCE_COLUMN: &str = "_distance";

pub const METADATA_KEY_COLUMN: &str = "key";
pub const METADATA_VALUE_COLUMN: &str = "value";
pub const VECTOR_SIZE_KEY: &str = "vector_size";
pub const INDEXING_COMPLETE_KEY: &str = "indexing_complete";

const WORKSPACE_HASH_LENGTH: usize = 16;

/// Directory name for a workspace's database: `<basename>-<sha256(path)[..16]>`
#[inline]
pub fn database_directory_name(workspace_path: &Path) -> String {
    let basename = workspace_path
        .file_name()
        .map_or_else(|| "workspace".into(), |name| name.to_string_lossy());

    let mut hasher = Sha256::new();
    hasher.update(workspace_path.to_string_lossy().as_bytes());
    let hash_hex = format!("{:x}", hasher.finalize());

    format!("{}-{}", basename, &hash_hex[..WORKSPACE_HASH_LENGTH])
}

/// Embedding width as an Arrow fixed-size list length
#[inline]
pub fn vector_list_size(vector_size: usize) -> Result<i32> {
    i32::try_from(vector_size)
        .map_err(|_| CodeIndexError::Database(format!("Vector size {} too large", vector_size)))
}

/// Schema of the vector table for the given embedding width
#[inline]
pub fn vector_schema(vector_size: usize) -> Result<SchemaRef> {
    Ok(Arc::new(Schema::new(vec![
        Field::new(ID_COLUMN, DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                vector_list_size(vector_size)?,
            ),
            false,
        ),
        Field::new(FILE_PATH_COLUMN, DataType::Utf8, false),
        Field::new(CODE_CHUNK_COLUMN, DataType::Utf8, false),
        Field::new(START_LINE_COLUMN, DataType::Int64, false),
        Field::new(END_LINE_COLUMN, DataType::Int64, false),
    ])))
}

#[inline]
pub fn metadata_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(METADATA_KEY_COLUMN, DataType::Utf8, false),
        Field::new(METADATA_VALUE_COLUMN, DataType::Utf8, false),
    ]))
}

/// Width of the vector column in an existing table schema
#[inline]
pub fn vector_width(schema: &Schema) -> Option<usize> {
    schema
        .field_with_name(VECTOR_COLUMN)
        .ok()
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
}
