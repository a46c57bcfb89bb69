use async_trait::async_trait;
use std::cmp::Ordering;

use docqa_core::corpus::Corpus;
use docqa_core::similarity::cosine_similarity;
use docqa_core::traits::{Embedder, VectorIndex};
use docqa_core::types::{ChunkId, ChunkMetadata, Filter, VectorMatch};
use docqa_core::{Error, Result};

use crate::filter::matches;

struct Entry { id: ChunkId, vector: Vec<f32>, metadata: ChunkMetadata }

/// Brute-force cosine index for small corpora and tests.
#[derive(Default)]
pub struct MemoryVectorIndex { entries: Vec<Entry> }

impl MemoryVectorIndex {
	pub fn new() -> Self { Self::default() }

	pub fn insert(&mut self, id: impl Into<ChunkId>, vector: Vec<f32>, metadata: ChunkMetadata) {
		self.entries.push(Entry { id: id.into(), vector, metadata });
	}

	/// Embed every corpus chunk with `embedder`, in corpus order.
	pub fn from_corpus(corpus: &Corpus, embedder: &dyn Embedder) -> anyhow::Result<Self> {
		let texts: Vec<String> = corpus.iter().map(|c| c.text.clone()).collect();
		let vectors = embedder.embed_batch(&texts)?;
		let mut index = Self::new();
		for (chunk, vector) in corpus.iter().zip(vectors) { index.insert(chunk.id.clone(), vector, chunk.metadata.clone()); }
		Ok(index)
	}

	pub fn len(&self) -> usize { self.entries.len() }

	pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
	async fn query(&self, vector: &[f32], top_k: usize, filter: Option<&Filter>) -> Result<Vec<VectorMatch>> {
		if vector.is_empty() { return Err(Error::VectorIndex("empty query vector".to_string())); }
		let mut scored = Vec::new();
		for (pos, e) in self.entries.iter().enumerate() {
			if let Some(f) = filter { if !matches(&e.id, &e.metadata, f)? { continue; } }
			scored.push((pos, cosine_similarity(vector, &e.vector)));
		}
		// ties keep insertion order
		scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
		scored.truncate(top_k);
		Ok(scored.into_iter().map(|(pos, score)| {
			let e = &self.entries[pos];
			VectorMatch { id: e.id.clone(), score, metadata: Some(e.metadata.clone()) }
		}).collect())
	}
}
