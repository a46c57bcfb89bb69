//! docqa-hybrid
//!
//! The retrieval pipeline: parallel semantic + keyword search, rank-based
//! fusion, category diversity, cross-encoder re-ranking and the response
//! cache, assembled behind [`HybridRetriever`].
pub mod cache;
pub mod diversity;
pub mod fusion;
pub mod orchestrator;
pub mod pipeline;
pub mod reranker;

pub use cache::{CacheHit, CacheStats, HitKind, ResponseCache, ResponseCacheConfig};
pub use diversity::DiversityBooster;
pub use fusion::FusionRanker;
pub use orchestrator::{ParallelSearchOrchestrator, SearchOutcome};
pub use pipeline::{CacheOutcome, Degradation, HybridRetriever, HybridRetrieverBuilder, RetrieverStats, SearchReport};
pub use reranker::{RerankMode, RerankOutcome, Reranker, RerankerStats};
