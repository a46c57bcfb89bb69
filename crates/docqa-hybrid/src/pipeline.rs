use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use docqa_core::config::RetrievalConfig;
use docqa_core::corpus::Corpus;
use docqa_core::error::{Error, Result};
use docqa_core::traits::{EmbeddingProvider, KeywordIndex, PairScorerLoader, VectorIndex};
use docqa_core::types::{PipelineOutput, ProcessedQuery, RetrievedChunk};
use docqa_text::QueryProcessor;

use crate::cache::{CacheStats, HitKind, ResponseCache, ResponseCacheConfig};
use crate::diversity::DiversityBooster;
use crate::fusion::FusionRanker;
use crate::orchestrator::ParallelSearchOrchestrator;
use crate::reranker::{RerankMode, Reranker, RerankerStats};

/// A stage that failed softly during one run. Degraded runs still return
/// results but are never written to the response cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    KeywordSearch(String),
    Rerank(String),
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::KeywordSearch(reason) => write!(f, "keyword search degraded: {reason}"),
            Degradation::Rerank(reason) => write!(f, "rerank degraded: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// No cache configured, or it is switched off.
    Bypassed,
    Miss,
    ExactHit,
    SemanticHit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub results: Vec<RetrievedChunk>,
    pub cache: CacheOutcome,
    pub degradations: Vec<Degradation>,
    /// `None` when the answer came from the cache.
    pub processed: Option<ProcessedQuery>,
}

impl SearchReport {
    fn empty(cache: CacheOutcome) -> Self {
        Self { results: Vec::new(), cache, degradations: Vec::new(), processed: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieverStats {
    pub searches: u64,
    pub cache_hits: u64,
    pub degraded_runs: u64,
    pub failed_runs: u64,
    pub rerank: Option<RerankerStats>,
    pub cache: Option<CacheStats>,
}

#[derive(Default)]
struct Counters {
    searches: AtomicU64,
    cache_hits: AtomicU64,
    degraded_runs: AtomicU64,
    failed_runs: AtomicU64,
}

/// The retrieval pipeline: cache → query processing → parallel search →
/// fusion → diversity → optional re-ranking → top-k.
pub struct HybridRetriever {
    config: RetrievalConfig,
    processor: QueryProcessor,
    orchestrator: ParallelSearchOrchestrator,
    fusion: FusionRanker,
    diversity: DiversityBooster,
    reranker: Option<Reranker>,
    cache: Option<ResponseCache>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    counters: Counters,
}

impl HybridRetriever {
    pub fn builder(config: RetrievalConfig) -> HybridRetrieverBuilder {
        HybridRetrieverBuilder { config, ..Default::default() }
    }

    pub fn config(&self) -> &RetrievalConfig { &self.config }

    pub fn cache(&self) -> Option<&ResponseCache> { self.cache.as_ref() }

    pub fn rerank_mode(&self) -> Option<RerankMode> { self.reranker.as_ref().map(Reranker::mode) }

    pub async fn search(&self, query: &str, query_embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        Ok(self.search_detailed(query, query_embedding, k).await?.results)
    }

    /// Embed `query` with the configured provider, then [`search`](Self::search).
    pub async fn search_text(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let embedder = self.embedder.as_ref().ok_or_else(|| Error::InvalidConfig("no embedding provider configured".to_string()))?;
        let after = self.config.embed_timeout();
        let embedding = tokio::time::timeout(after, embedder.embed(query)).await.map_err(|_| Error::Timeout { what: "query embedding", after })??;
        self.search(query, &embedding, k).await
    }

    pub async fn search_detailed(&self, query: &str, query_embedding: &[f32], k: usize) -> Result<SearchReport> {
        self.counters.searches.fetch_add(1, Ordering::Relaxed);
        let active_cache = self.cache.as_ref().filter(|c| c.is_enabled());
        if k == 0 {
            return Ok(SearchReport::empty(CacheOutcome::Bypassed));
        }

        let mut cache_outcome = CacheOutcome::Bypassed;
        if let Some(cache) = active_cache {
            cache_outcome = CacheOutcome::Miss;
            if let Some(hit) = cache.lookup(query, Some(query_embedding)).await {
                if hit.output.len() >= k || hit.complete {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    let mut results = hit.output;
                    results.truncate(k);
                    let cache = match hit.kind { HitKind::Exact => CacheOutcome::ExactHit, HitKind::Semantic => CacheOutcome::SemanticHit };
                    return Ok(SearchReport { results, cache, degradations: Vec::new(), processed: None });
                }
                debug!(cached = hit.output.len(), k, "cached answer too short, running pipeline");
            }
        }

        let report = self.run(query, query_embedding, k, cache_outcome).await;
        match &report {
            Ok(r) if !r.degradations.is_empty() => { self.counters.degraded_runs.fetch_add(1, Ordering::Relaxed); }
            Err(_) => { self.counters.failed_runs.fetch_add(1, Ordering::Relaxed); }
            Ok(_) => {}
        }
        report
    }

    async fn run(&self, query: &str, query_embedding: &[f32], k: usize, cache: CacheOutcome) -> Result<SearchReport> {
        let cfg = &self.config;
        let keep = match &self.reranker {
            Some(_) => k.max(cfg.rerank_final_k),
            None => k.max(cfg.final_k),
        };
        let pool = cfg.max_results.max(keep);

        let processed = self.processor.process(query);
        debug!(intent = ?processed.intent, terms = processed.technical_terms.len(), "processed query");

        let mut degradations = Vec::new();
        let outcome = self.orchestrator.search(&processed, query_embedding, pool).await?;
        if let Some(reason) = outcome.keyword_error {
            degradations.push(Degradation::KeywordSearch(reason));
        }

        let fused = self.fusion.fuse(&outcome.semantic, &outcome.keyword, cfg.semantic_weight, cfg.keyword_weight);
        let diversified = self.diversity.diversify(fused);
        debug!(candidates = diversified.len(), "fused and diversified");

        let ranked = match &self.reranker {
            Some(reranker) => {
                let outcome = reranker.rerank(query, diversified, cfg.rerank_top_k.max(keep), keep).await;
                if let Some(reason) = outcome.degraded {
                    degradations.push(Degradation::Rerank(reason));
                }
                outcome.results
            }
            None => {
                let mut d = diversified;
                d.truncate(keep);
                d
            }
        };

        let output: PipelineOutput = ranked.iter().map(RetrievedChunk::from).collect();
        if let Some(store) = self.cache.as_ref().filter(|c| c.is_enabled()) {
            if degradations.is_empty() {
                store.store_for_request(query, output.clone(), Some(query_embedding.to_vec()), keep).await;
            } else {
                debug!(degradations = degradations.len(), "degraded run not cached");
            }
        }

        let mut results = output;
        results.truncate(k);
        Ok(SearchReport { results, cache, degradations, processed: Some(processed) })
    }

    pub fn stats(&self) -> RetrieverStats {
        RetrieverStats {
            searches: self.counters.searches.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            degraded_runs: self.counters.degraded_runs.load(Ordering::Relaxed),
            failed_runs: self.counters.failed_runs.load(Ordering::Relaxed),
            rerank: self.reranker.as_ref().map(Reranker::stats),
            cache: self.cache.as_ref().map(ResponseCache::stats),
        }
    }

    /// Stop background work (the cache sweep).
    pub fn close(&self) {
        if let Some(cache) = &self.cache { cache.close(); }
    }
}

#[derive(Default)]
pub struct HybridRetrieverBuilder {
    config: RetrievalConfig,
    corpus: Option<Arc<Corpus>>,
    vector: Option<Arc<dyn VectorIndex>>,
    keyword: Option<Arc<dyn KeywordIndex>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    rerank_loader: Option<Arc<dyn PairScorerLoader>>,
}

impl HybridRetrieverBuilder {
    pub fn corpus(mut self, corpus: Arc<Corpus>) -> Self { self.corpus = Some(corpus); self }
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self { self.vector = Some(index); self }
    pub fn keyword_index(mut self, index: Arc<dyn KeywordIndex>) -> Self { self.keyword = Some(index); self }
    /// Used by the response cache when a lookup arrives without an embedding, and by `search_text`.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self { self.embedder = Some(provider); self }
    /// Without a loader, re-ranking (when enabled) uses the lexical fallback.
    pub fn rerank_loader(mut self, loader: Arc<dyn PairScorerLoader>) -> Self { self.rerank_loader = Some(loader); self }

    pub fn build(self) -> Result<HybridRetriever> {
        let config = self.config;
        config.validate()?;
        let corpus = self.corpus.ok_or_else(|| Error::InvalidConfig("corpus is required".to_string()))?;
        let vector = self.vector.ok_or_else(|| Error::InvalidConfig("vector index is required".to_string()))?;
        let keyword = self.keyword.ok_or_else(|| Error::InvalidConfig("keyword index is required".to_string()))?;
        if keyword.is_empty() {
            warn!("keyword index is empty; results will be semantic only");
        }

        let cache = if config.cache_enabled {
            Some(ResponseCache::new(ResponseCacheConfig::from(&config), self.embedder.clone())?)
        } else {
            None
        };
        let reranker = config
            .rerank_enabled
            .then(|| Reranker::new(self.rerank_loader, config.rerank_batch_size, config.rerank_cache_size, config.search_timeout()));

        info!(
            chunks = corpus.len(),
            rerank = config.rerank_enabled,
            cache = config.cache_enabled,
            "hybrid retriever ready"
        );
        Ok(HybridRetriever {
            processor: QueryProcessor::new(),
            orchestrator: ParallelSearchOrchestrator::new(vector, keyword, Arc::clone(&corpus), config.vector_filter.clone(), config.search_timeout()),
            fusion: FusionRanker::new(corpus),
            diversity: DiversityBooster::new(config.diversity_boost),
            reranker,
            cache,
            embedder: self.embedder,
            counters: Counters::default(),
            config,
        })
    }
}
