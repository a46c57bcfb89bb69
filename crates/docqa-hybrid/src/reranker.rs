//! Cross-encoder re-ranking with a deterministic lexical fallback.
//!
//! The model is resolved once, on the first call to [`Reranker::rerank`]:
//! a successful load moves the reranker to [`RerankMode::ModelReady`], a
//! failed (or absent) loader pins it to [`RerankMode::Fallback`] for good.
//! In `ModelReady`, a failing batch only degrades the current call.
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use docqa_core::error::{Error, Result};
use docqa_core::traits::{PairScorer, PairScorerLoader};
use docqa_core::types::FusedResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankMode {
    Uninitialized,
    ModelReady,
    Fallback,
}

impl fmt::Display for RerankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RerankMode::Uninitialized => "uninitialized",
            RerankMode::ModelReady => "model_ready",
            RerankMode::Fallback => "fallback",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub results: Vec<FusedResult>,
    /// Set when the model failed for this call and fallback scores were used.
    pub degraded: Option<String>,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerankerStats {
    pub mode: RerankMode,
    pub cache_size: usize,
    pub cache_capacity: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub model_batches: u64,
    pub fallback_calls: u64,
}

/// Bounded score memo; the oldest insertion is dropped first.
struct ScoreCache {
    order: VecDeque<String>,
    scores: HashMap<String, Vec<f32>>,
    capacity: usize,
}

impl ScoreCache {
    fn new(capacity: usize) -> Self {
        Self { order: VecDeque::new(), scores: HashMap::new(), capacity: capacity.max(1) }
    }

    fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.scores.get(key).cloned()
    }

    fn insert(&mut self, key: String, scores: Vec<f32>) {
        if let Some(existing) = self.scores.get_mut(&key) {
            *existing = scores;
            return;
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => { self.scores.remove(&oldest); }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.scores.insert(key, scores);
    }

    fn len(&self) -> usize { self.order.len() }

    fn clear(&mut self) {
        self.order.clear();
        self.scores.clear();
    }
}

pub struct Reranker {
    loader: Option<Arc<dyn PairScorerLoader>>,
    model: OnceCell<Option<Arc<dyn PairScorer>>>,
    batch_size: usize,
    timeout: Duration,
    cache: Mutex<ScoreCache>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    model_batches: AtomicU64,
    fallback_calls: AtomicU64,
}

impl Reranker {
    /// `loader == None` runs the lexical fallback only.
    pub fn new(loader: Option<Arc<dyn PairScorerLoader>>, batch_size: usize, cache_size: usize, timeout: Duration) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
            batch_size: batch_size.max(1),
            timeout,
            cache: Mutex::new(ScoreCache::new(cache_size)),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            model_batches: AtomicU64::new(0),
            fallback_calls: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> RerankMode {
        match self.model.get() {
            None => RerankMode::Uninitialized,
            Some(Some(_)) => RerankMode::ModelReady,
            Some(None) => RerankMode::Fallback,
        }
    }

    pub fn stats(&self) -> RerankerStats {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        RerankerStats {
            mode: self.mode(),
            cache_size: cache.len(),
            cache_capacity: cache.capacity,
            cache_hits: self.cache_hits.load(AtomicOrdering::Relaxed),
            cache_misses: self.cache_misses.load(AtomicOrdering::Relaxed),
            model_batches: self.model_batches.load(AtomicOrdering::Relaxed),
            fallback_calls: self.fallback_calls.load(AtomicOrdering::Relaxed),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    async fn scorer(&self) -> Option<Arc<dyn PairScorer>> {
        self.model
            .get_or_init(|| async {
                let Some(loader) = &self.loader else {
                    info!("no rerank model configured, using lexical fallback");
                    return None;
                };
                match loader.load().await {
                    Ok(model) => {
                        info!("rerank model loaded");
                        Some(model)
                    }
                    Err(e) => {
                        warn!(error = %e, "rerank model failed to load, using lexical fallback");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Score the first `top_k` candidates, order them by relevance and keep `final_k`.
    pub async fn rerank(&self, query: &str, mut candidates: Vec<FusedResult>, top_k: usize, final_k: usize) -> RerankOutcome {
        candidates.truncate(top_k);
        if candidates.is_empty() || final_k == 0 {
            return RerankOutcome { results: Vec::new(), degraded: None, cached: false };
        }

        let key = cache_key(query, &candidates);
        let cached = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key).filter(|s| s.len() == candidates.len());

        let (scores, degraded, from_cache) = match cached {
            Some(scores) => {
                self.cache_hits.fetch_add(1, AtomicOrdering::Relaxed);
                (scores, None, true)
            }
            None => {
                self.cache_misses.fetch_add(1, AtomicOrdering::Relaxed);
                let texts: Vec<String> = candidates.iter().map(|c| c.chunk.text.clone()).collect();
                let (scores, degraded) = match self.scorer().await {
                    Some(model) => match self.score_with_model(model.as_ref(), query, &texts).await {
                        Ok(scores) => (scores, None),
                        Err(e) => {
                            warn!(error = %e, "rerank batch failed, using lexical fallback for this query");
                            (self.fallback_scores(query, &texts), Some(e.to_string()))
                        }
                    },
                    None => (self.fallback_scores(query, &texts), None),
                };
                if degraded.is_none() {
                    self.cache.lock().unwrap_or_else(|e| e.into_inner()).insert(key, scores.clone());
                }
                (scores, degraded, false)
            }
        };

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.rerank_score = Some(score);
        }
        candidates.sort_by(|a, b| {
            b.rerank_score.unwrap_or(0.0).partial_cmp(&a.rerank_score.unwrap_or(0.0)).unwrap_or(Ordering::Equal)
        });
        candidates.truncate(final_k);
        debug!(kept = candidates.len(), mode = %self.mode(), cached = from_cache, "reranked candidates");
        RerankOutcome { results: candidates, degraded, cached: from_cache }
    }

    async fn score_with_model(&self, model: &dyn PairScorer, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_scores = tokio::time::timeout(self.timeout, model.score_pairs(query, batch))
                .await
                .map_err(|_| Error::Timeout { what: "rerank batch", after: self.timeout })??;
            if batch_scores.len() != batch.len() {
                return Err(Error::RerankModel(format!("expected {} scores, got {}", batch.len(), batch_scores.len())));
            }
            self.model_batches.fetch_add(1, AtomicOrdering::Relaxed);
            scores.extend(batch_scores.into_iter().map(|s| if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 }));
        }
        Ok(scores)
    }

    fn fallback_scores(&self, query: &str, texts: &[String]) -> Vec<f32> {
        self.fallback_calls.fetch_add(1, AtomicOrdering::Relaxed);
        texts.iter().map(|t| fallback_score(query, t)).collect()
    }
}

fn cache_key(query: &str, candidates: &[FusedResult]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(query.as_bytes());
    for c in candidates {
        hasher.update(&[0]);
        hasher.update(c.id().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn lexical_tokens(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned.to_lowercase().split_whitespace().filter(|t| t.chars().count() > 2).map(str::to_string).collect()
}

/// `0.6 * jaccard + 0.4 * term-frequency overlap`, clamped to `[0, 1]`.
///
/// Only tokens longer than two characters count, after punctuation is
/// replaced by whitespace and the text lowercased.
pub fn fallback_score(query: &str, text: &str) -> f32 {
    let q = lexical_tokens(query);
    let d = lexical_tokens(text);
    let q_set: HashSet<&str> = q.iter().map(String::as_str).collect();
    let d_set: HashSet<&str> = d.iter().map(String::as_str).collect();

    let union = q_set.union(&d_set).count();
    let shared: Vec<&str> = q_set.intersection(&d_set).copied().collect();
    let jaccard = if union == 0 { 0.0 } else { shared.len() as f32 / union as f32 };

    fn counts(tokens: &[String]) -> HashMap<&str, usize> {
        let mut tf = HashMap::new();
        for t in tokens {
            *tf.entry(t.as_str()).or_default() += 1;
        }
        tf
    }
    let (q_tf, d_tf) = (counts(&q), counts(&d));
    let tf_sim = if q_set.is_empty() {
        0.0
    } else {
        let overlap: f32 = shared
            .iter()
            .map(|t| {
                let (fq, fd) = (q_tf[t] as f32, d_tf[t] as f32);
                fq.min(fd) / fq.max(fd)
            })
            .sum();
        overlap / q_set.len() as f32
    };

    (0.6 * jaccard + 0.4 * tf_sim).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_on_identical_and_disjoint_text() {
        assert!((fallback_score("order webhook events", "order webhook events") - 1.0).abs() < 1e-6);
        assert_eq!(fallback_score("order webhook", "theme editor"), 0.0);
        assert_eq!(fallback_score("", "anything here"), 0.0);
        assert_eq!(fallback_score("a an of", "a an of"), 0.0, "short tokens never count");
    }

    #[test]
    fn fallback_term_frequency_overlap() {
        // same vocabulary, each shared term at half the other side's frequency
        let score = fallback_score("order order webhook", "order webhook webhook");
        assert!((score - 0.8).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn fallback_ignores_case_and_punctuation() {
        let a = fallback_score("Create a Product!", "create product via the admin api");
        let b = fallback_score("create product", "CREATE, product... via the ADMIN api");
        assert!((a - b).abs() < 1e-6);
        // jaccard 2/6, tf 2/2
        assert!((a - (0.6 * 2.0 / 6.0 + 0.4)).abs() < 1e-6);
    }

    #[test]
    fn score_cache_is_fifo() {
        let mut cache = ScoreCache::new(2);
        cache.insert("a".into(), vec![1.0]);
        cache.insert("b".into(), vec![2.0]);
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), vec![3.0]);
        assert!(cache.get("a").is_none(), "oldest insertion goes first even if recently read");
        assert_eq!(cache.get("b"), Some(vec![2.0]));
        assert_eq!(cache.len(), 2);
    }
}
