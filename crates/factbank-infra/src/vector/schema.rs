//! Arrow schema for the LanceDB memory table.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// BGESmallENV15 embedding dimension, the default local model.
pub const DEFAULT_EMBEDDING_DIMENSION: i32 = 384;

/// Default table name for memories.
pub const DEFAULT_TABLE_NAME: &str = "memories";

/// Schema for a memory table whose vectors have `dimension` components.
///
/// `metadata` holds the JSON-encoded metadata object. Timestamps are RFC 3339
/// strings; `updated_at` is null until the record is first updated.
pub fn memory_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("updated_at", DataType::Utf8, true),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ])
}

/// Vector dimension declared by a memory table's schema, if it has one.
pub fn vector_dimension(schema: &Schema) -> Option<i32> {
    match schema.field_with_name("vector").ok()?.data_type() {
        DataType::FixedSizeList(_, size) => Some(*size),
        _ => None,
    }
}
