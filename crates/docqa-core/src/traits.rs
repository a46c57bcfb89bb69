use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{Filter, KeywordField, KeywordMatch, VectorMatch};

/// Synchronous batch embedder (local models run on the calling thread).
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Text → vector. May fail on provider outage.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Opaque nearest-neighbour service.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(&self, vector: &[f32], top_k: usize, filter: Option<&Filter>) -> Result<Vec<VectorMatch>>;
}

/// In-process full-text index, read-only once built.
///
/// `fields == None` searches every indexed field.
pub trait KeywordIndex: Send + Sync {
    fn search(&self, query: &str, limit: usize, fields: Option<&[KeywordField]>) -> Result<Vec<KeywordMatch>>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Pairwise relevance model: scores `(query, text)` pairs jointly.
///
/// Returns one relevance probability in `[0, 1]` per text, in input order.
#[async_trait]
pub trait PairScorer: Send + Sync {
    async fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>>;
}

/// Produces the re-ranking model on first use. A failed load is final for
/// the lifetime of the reranker that called it.
#[async_trait]
pub trait PairScorerLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn PairScorer>>;
}
