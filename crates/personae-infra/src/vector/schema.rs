//! Arrow schema for the LanceDB reference chunk table.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Name of the single table shared by every persona.
pub const REFERENCE_TABLE: &str = "reference_chunks";

/// Schema for the reference chunk table.
///
/// Column order matters: rows are decoded by index in `lance.rs`.
pub fn reference_chunks_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("persona_id", DataType::Int64, false),
        Field::new("persona_name", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("tag_1", DataType::Utf8, true),
        Field::new("tag_2", DataType::Utf8, true),
        Field::new("tag_3", DataType::Utf8, true),
        Field::new("ordinal", DataType::Int32, false),
        Field::new("provenance", DataType::Utf8, false),
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
