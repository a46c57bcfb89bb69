use arrow_schema::{Schema, Field, DataType};
use std::sync::Arc;

pub const EMBEDDING_DIM: i32 = 1024;

/// One row per chunk: id, text, flattened metadata and the embedding.
pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("title", DataType::Utf8, false),
		Field::new("section", DataType::Utf8, false),
		Field::new("category", DataType::Utf8, false),
		Field::new("merchant_level", DataType::Utf8, false),
		Field::new("source_url", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
