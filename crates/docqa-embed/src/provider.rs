use async_trait::async_trait;
use std::sync::Arc;

use docqa_core::traits::{Embedder, EmbeddingProvider};
use docqa_core::{Error, Result};

/// Async adapter running a synchronous [`Embedder`] on the blocking pool.
#[derive(Clone)]
pub struct BlockingEmbeddingProvider { inner: Arc<dyn Embedder> }

impl BlockingEmbeddingProvider {
    pub fn new(inner: Arc<dyn Embedder>) -> Self { Self { inner } }

    pub fn dim(&self) -> usize { self.inner.dim() }
}

impl From<Box<dyn Embedder>> for BlockingEmbeddingProvider {
    fn from(inner: Box<dyn Embedder>) -> Self { Self { inner: Arc::from(inner) } }
}

#[async_trait]
impl EmbeddingProvider for BlockingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inner = self.inner.clone();
        let texts = vec![text.to_string()];
        let mut out = tokio::task::spawn_blocking(move || inner.embed_batch(&texts))
            .await
            .map_err(|e| Error::Embedding(format!("embedding task failed: {e}")))?
            .map_err(|e| Error::Embedding(e.to_string()))?;
        out.pop().ok_or_else(|| Error::Embedding("embedder returned no vector".to_string()))
    }
}
