use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::{connect, Connection};
use arrow_array::{RecordBatch, RecordBatchIterator, Int32Array, FixedSizeListArray, StringArray};
use std::sync::Arc;
use std::path::Path;
use tracing::info;

use docqa_core::traits::Embedder;
use docqa_core::types::Chunk;
use crate::schema::build_arrow_schema;

const INSERT_BATCH: usize = 1000;

/// Bulk loader for the chunk table. Appends to an existing table unless
/// [`LanceWriter::reset`] is called first.
pub struct LanceWriter { db: Connection, table_name: String }

impl LanceWriter {
	pub async fn new(db_path: &Path, table_name: &str) -> Result<Self> {
		let db = connect(db_path.to_string_lossy().as_ref()).execute().await?;
		Ok(Self { db, table_name: table_name.to_string() })
	}

	async fn table_exists(&self) -> Result<bool> { Ok(self.db.table_names().execute().await?.contains(&self.table_name)) }

	/// Remove every row of the table, keeping its schema.
	pub async fn reset(&self) -> Result<()> {
		if self.table_exists().await? {
			self.db.open_table(&self.table_name).execute().await?.delete("true").await?;
			info!(table = %self.table_name, "table cleared");
		}
		Ok(())
	}

	pub async fn write(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<usize> {
		if chunks.is_empty() { info!("no chunks to index"); return Ok(0); }
		if chunks.len() != embeddings.len() { bail!("chunks ({}) and embeddings ({}) length must match", chunks.len(), embeddings.len()); }
		info!(n = chunks.len(), table = %self.table_name, "indexing chunks into LanceDB");
		let pb = ProgressBar::new(chunks.len() as u64);
		pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?.progress_chars("#>-"));
		let mut processed = 0usize;
		for (chunk_batch, emb_batch) in chunks.chunks(INSERT_BATCH).zip(embeddings.chunks(INSERT_BATCH)) {
			self.insert_batch(chunk_batch, emb_batch).await?;
			processed += chunk_batch.len(); pb.set_position(processed as u64);
		}
		pb.finish_with_message("done");
		info!(processed, "LanceDB indexing completed");
		Ok(processed)
	}

	/// Embed chunk texts in batches of `batch_size`, then [`write`](Self::write).
	pub async fn ingest(&self, chunks: &[Chunk], embedder: &dyn Embedder, batch_size: usize) -> Result<usize> {
		let mut embeddings = Vec::with_capacity(chunks.len());
		for batch in chunks.chunks(batch_size.max(1)) {
			let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
			embeddings.extend(embedder.embed_batch(&texts)?);
		}
		self.write(chunks, &embeddings).await
	}

	async fn insert_batch(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
		let record_batch = to_record_batch(chunks, embeddings)?; let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		if self.table_exists().await? {
			self.db.open_table(&self.table_name).execute().await?.add(reader).execute().await?;
		} else {
			self.db.create_table(&self.table_name, reader).execute().await?;
		}
		Ok(())
	}
}

fn to_record_batch(chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
	let dim = embeddings.first().map(|v| v.len()).unwrap_or(0);
	if let Some(bad) = embeddings.iter().find(|v| v.len() != dim) { bail!("inconsistent embedding dim: {} vs {}", bad.len(), dim); }
	let schema = build_arrow_schema(dim as i32);
	let col = |pick: &dyn Fn(&Chunk) -> String| StringArray::from(chunks.iter().map(pick).collect::<Vec<_>>());
	let vectors = embeddings.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
	let record_batch = RecordBatch::try_new(schema, vec![
		Arc::new(col(&|c| c.id.clone())),
		Arc::new(col(&|c| c.text.clone())),
		Arc::new(col(&|c| c.metadata.title.clone())),
		Arc::new(col(&|c| c.metadata.section.clone())),
		Arc::new(col(&|c| c.metadata.category.clone())),
		Arc::new(col(&|c| c.metadata.merchant_level.clone())),
		Arc::new(col(&|c| c.metadata.source_url.clone())),
		Arc::new(Int32Array::from(chunks.iter().map(|c| c.metadata.chunk_index as i32).collect::<Vec<_>>())),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim as i32)),
	])?;
	Ok(record_batch)
}
