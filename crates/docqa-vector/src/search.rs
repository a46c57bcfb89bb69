use anyhow::{anyhow, Result as AnyResult};
use arrow_array::{Array, Float32Array, Int32Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, DistanceType, Table};
use std::path::Path;
use tracing::debug;

use docqa_core::traits::VectorIndex;
use docqa_core::types::{ChunkMetadata, Filter, VectorMatch};
use docqa_core::{Error, Result};

use crate::filter::to_sql;

/// Nearest-neighbour search over a LanceDB chunk table (cosine distance,
/// `score = 1 - distance`).
pub struct LanceVectorIndex { table: Table }

impl LanceVectorIndex {
	pub async fn open(db_path: &Path, table_name: &str) -> AnyResult<Self> {
		let db = connect(db_path.to_string_lossy().as_ref()).execute().await?;
		let table = db.open_table(table_name).execute().await?;
		Ok(Self { table })
	}

	async fn query_inner(&self, vector: &[f32], top_k: usize, predicate: Option<String>) -> AnyResult<Vec<VectorMatch>> {
		let mut query = self.table.vector_search(vector.to_vec())?.distance_type(DistanceType::Cosine).limit(top_k);
		if let Some(sql) = predicate { query = query.only_if(sql); }
		let mut stream = query.execute().await?;
		let mut matches = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let ids = str_col(&batch, "id")?;
			let distance = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
			for i in 0..batch.num_rows() {
				let score = distance.map(|d| 1.0 - d.value(i)).unwrap_or(0.0);
				matches.push(VectorMatch { id: ids.value(i).to_string(), score, metadata: metadata_at(&batch, i) });
			}
		}
		Ok(matches)
	}
}

fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> AnyResult<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("missing string column '{}'", name))
}

fn metadata_at(batch: &RecordBatch, i: usize) -> Option<ChunkMetadata> {
	let s = |name: &str| str_col(batch, name).ok().map(|c| c.value(i).to_string());
	let chunk_index = batch.column_by_name("chunk_index").and_then(|c| c.as_any().downcast_ref::<Int32Array>()).map(|c| c.value(i).max(0) as usize);
	Some(ChunkMetadata {
		title: s("title")?,
		section: s("section")?,
		category: s("category")?,
		merchant_level: s("merchant_level")?,
		source_url: s("source_url")?,
		chunk_index: chunk_index?,
	})
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
	async fn query(&self, vector: &[f32], top_k: usize, filter: Option<&Filter>) -> Result<Vec<VectorMatch>> {
		if top_k == 0 { return Ok(vec![]); }
		let predicate = match filter { Some(f) => to_sql(f)?, None => None };
		debug!(top_k, ?predicate, "lance vector query");
		self.query_inner(vector, top_k, predicate).await.map_err(|e| Error::VectorIndex(e.to_string()))
	}
}
