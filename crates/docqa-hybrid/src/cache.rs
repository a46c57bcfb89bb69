//! Response cache in front of the whole retrieval pipeline.
//!
//! Lookups try the exact key first, then (once enough entries carry an
//! embedding) a cosine scan over stored query embeddings. Entries expire
//! `max_age` after creation; a background sweep removes them and `store`
//! evicts the least recently used entry beyond `max_size`.
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use docqa_core::config::RetrievalConfig;
use docqa_core::error::{Error, Result};
use docqa_core::similarity::cosine_similarity;
use docqa_core::traits::EmbeddingProvider;
use docqa_core::types::PipelineOutput;

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCacheConfig {
    pub max_size: usize,
    pub max_age: Duration,
    pub cleanup_interval: Duration,
    pub semantic_threshold: f32,
    pub early_exit_threshold: f32,
    pub min_population: usize,
    pub embed_timeout: Duration,
}

impl From<&RetrievalConfig> for ResponseCacheConfig {
    fn from(cfg: &RetrievalConfig) -> Self {
        Self {
            max_size: cfg.cache_max_size,
            max_age: cfg.cache_max_age(),
            cleanup_interval: cfg.cache_cleanup_interval(),
            semantic_threshold: cfg.semantic_cache_threshold,
            early_exit_threshold: cfg.semantic_cache_early_exit_threshold,
            min_population: cfg.cache_min_population_for_semantic_match,
            embed_timeout: cfg.embed_timeout(),
        }
    }
}

impl Default for ResponseCacheConfig {
    fn default() -> Self { Self::from(&RetrievalConfig::default()) }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub data: PipelineOutput,
    pub query_embedding: Option<Vec<f32>>,
    /// Result count the producing run asked for. `data` shorter than this
    /// means the run returned everything that was available.
    pub requested: usize,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub query_preview: String,
}

impl CacheEntry {
    pub fn is_complete(&self) -> bool { self.data.len() < self.requested }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Exact,
    Semantic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub output: PipelineOutput,
    pub kind: HitKind,
    /// Cosine similarity of the matched query; `1.0` for exact hits.
    pub similarity: f32,
    /// No larger request for this query can return more results.
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub enabled: bool,
    pub size: usize,
    pub max_size: usize,
    pub with_embeddings: usize,
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removed: u64,
}

/// Blake3 hex digest of the lowercased, trimmed query.
pub fn cache_key(query: &str) -> String {
    blake3::hash(query.trim().to_lowercase().as_bytes()).to_hex().to_string()
}

struct Inner {
    config: ResponseCacheConfig,
    entries: Mutex<LruCache<String, CacheEntry>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    enabled: AtomicBool,
    exact_hits: AtomicU64,
    semantic_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removed: AtomicU64,
}

impl Inner {
    fn entries(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) > self.config.max_age
    }

    fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let stale: Vec<String> = entries.iter().filter(|(_, e)| self.expired(e, now)).map(|(k, _)| k.clone()).collect();
        for key in &stale {
            entries.pop(key);
        }
        self.expired_removed.fetch_add(stale.len() as u64, Ordering::Relaxed);
        stale.len()
    }

    async fn embed(&self, query: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match tokio::time::timeout(self.config.embed_timeout, embedder.embed(query)).await {
            Ok(Ok(v)) => Some(v),
            Ok(Err(e)) => {
                warn!(error = %e, "cache embedding failed");
                None
            }
            Err(_) => {
                warn!(after = ?self.config.embed_timeout, "cache embedding timed out");
                None
            }
        }
    }
}

struct Sweeper {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ResponseCache {
    inner: Arc<Inner>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl ResponseCache {
    /// Starts the expiry sweep when called inside a Tokio runtime.
    pub fn new(config: ResponseCacheConfig, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.max_size).ok_or_else(|| Error::InvalidConfig("cache max_size must be greater than zero".to_string()))?;
        if config.cleanup_interval.is_zero() {
            return Err(Error::InvalidConfig("cache cleanup interval must be greater than zero".to_string()));
        }
        let inner = Arc::new(Inner {
            entries: Mutex::new(LruCache::new(capacity)),
            embedder,
            enabled: AtomicBool::new(true),
            exact_hits: AtomicU64::new(0),
            semantic_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired_removed: AtomicU64::new(0),
            config,
        });
        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(spawn_sweeper(&handle, Arc::clone(&inner))),
            Err(_) => {
                debug!("no runtime, cache sweep disabled");
                None
            }
        };
        Ok(Self { inner, sweeper: Mutex::new(sweeper) })
    }

    pub fn config(&self) -> &ResponseCacheConfig { &self.inner.config }

    pub fn is_enabled(&self) -> bool { self.inner.enabled.load(Ordering::Relaxed) }

    /// A disabled cache misses every lookup and ignores stores.
    pub fn set_enabled(&self, enabled: bool) { self.inner.enabled.store(enabled, Ordering::Relaxed); }

    pub async fn get(&self, query: &str) -> Option<PipelineOutput> {
        self.lookup(query, None).await.map(|hit| hit.output)
    }

    /// `embedding` is used for the semantic scan; without it the configured
    /// provider embeds the query. No embedding means exact lookups only.
    pub async fn lookup(&self, query: &str, embedding: Option<&[f32]>) -> Option<CacheHit> {
        if !self.is_enabled() {
            return None;
        }
        let inner = &self.inner;
        let key = cache_key(query);

        let population = {
            let now = Instant::now();
            let mut entries = inner.entries();
            if let Some(expired) = entries.peek(&key).map(|e| inner.expired(e, now)) {
                if expired {
                    entries.pop(&key);
                    inner.expired_removed.fetch_add(1, Ordering::Relaxed);
                } else if let Some(entry) = entries.get_mut(&key) {
                    entry.last_accessed_at = now;
                    inner.exact_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(preview = %entry.query_preview, "exact cache hit");
                    return Some(CacheHit {
                        output: entry.data.clone(),
                        kind: HitKind::Exact,
                        similarity: 1.0,
                        complete: entry.is_complete(),
                    });
                }
            }
            entries.iter().filter(|(_, e)| e.query_embedding.is_some()).count()
        };

        if population < inner.config.min_population {
            inner.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let owned;
        let query_embedding = match embedding {
            Some(v) => v,
            None => match inner.embed(query).await {
                Some(v) => {
                    owned = v;
                    owned.as_slice()
                }
                None => {
                    inner.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            },
        };

        let now = Instant::now();
        let mut entries = inner.entries();
        let mut best = 0.0f32;
        let mut best_key: Option<String> = None;
        for (k, entry) in entries.iter() {
            let Some(stored) = &entry.query_embedding else { continue };
            let sim = cosine_similarity(query_embedding, stored);
            if sim > best {
                best = sim;
                best_key = Some(k.clone());
                if best >= inner.config.early_exit_threshold {
                    break;
                }
            }
        }

        if best >= inner.config.semantic_threshold {
            if let Some(entry) = best_key.as_ref().and_then(|k| entries.get_mut(k)) {
                if now.saturating_duration_since(entry.created_at) <= inner.config.max_age {
                    entry.last_accessed_at = now;
                    inner.semantic_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(similarity = best, preview = %entry.query_preview, "semantic cache hit");
                    return Some(CacheHit {
                        output: entry.data.clone(),
                        kind: HitKind::Semantic,
                        similarity: best,
                        complete: entry.is_complete(),
                    });
                }
            }
        }
        inner.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub async fn set(&self, query: &str, output: PipelineOutput) {
        self.store(query, output, None).await
    }

    /// Store `output` under `query`. Without an explicit embedding the
    /// provider is asked; if that fails the entry only serves exact lookups.
    pub async fn store(&self, query: &str, output: PipelineOutput, embedding: Option<Vec<f32>>) {
        let requested = output.len();
        self.store_for_request(query, output, embedding, requested).await
    }

    /// Like [`store`](Self::store), recording that the run producing `output`
    /// asked for `requested` results.
    pub async fn store_for_request(&self, query: &str, output: PipelineOutput, embedding: Option<Vec<f32>>, requested: usize) {
        if !self.is_enabled() {
            return;
        }
        let inner = &self.inner;
        let embedding = match embedding {
            Some(v) => Some(v),
            None => inner.embed(query).await,
        };
        let key = cache_key(query);
        let now = Instant::now();
        let entry = CacheEntry {
            key: key.clone(),
            data: output,
            query_embedding: embedding,
            requested,
            created_at: now,
            last_accessed_at: now,
            query_preview: query.chars().take(PREVIEW_CHARS).collect(),
        };
        let evicted = inner.entries().push(key.clone(), entry);
        if let Some((evicted_key, old)) = evicted {
            if evicted_key != key {
                inner.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(preview = %old.query_preview, "evicted least recently used cache entry");
            }
        }
    }

    /// Remove every expired entry now; returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize { self.inner.remove_expired() }

    pub fn clear(&self) { self.inner.entries().clear(); }

    pub fn len(&self) -> usize { self.inner.entries().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn stats(&self) -> CacheStats {
        let inner = &self.inner;
        let (size, with_embeddings) = {
            let entries = inner.entries();
            (entries.len(), entries.iter().filter(|(_, e)| e.query_embedding.is_some()).count())
        };
        CacheStats {
            enabled: self.is_enabled(),
            size,
            max_size: inner.config.max_size,
            with_embeddings,
            exact_hits: inner.exact_hits.load(Ordering::Relaxed),
            semantic_hits: inner.semantic_hits.load(Ordering::Relaxed),
            misses: inner.misses.load(Ordering::Relaxed),
            evictions: inner.evictions.load(Ordering::Relaxed),
            expired_removed: inner.expired_removed.load(Ordering::Relaxed),
        }
    }

    /// Stop the background sweep. Idempotent; entries stay readable.
    pub fn close(&self) {
        let sweeper = self.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.shutdown.send(true);
            sweeper.task.abort();
            debug!("cache sweep stopped");
        }
    }
}

impl Drop for ResponseCache {
    fn drop(&mut self) { self.close(); }
}

fn spawn_sweeper(handle: &tokio::runtime::Handle, inner: Arc<Inner>) -> Sweeper {
    let (shutdown, mut stop) = watch::channel(false);
    let every = inner.config.cleanup_interval;
    let task = handle.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = inner.remove_expired();
                    if removed > 0 { debug!(removed, "swept expired cache entries"); }
                }
                _ = stop.changed() => break,
            }
        }
    });
    Sweeper { shutdown, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::types::{ChunkMetadata, RetrievedChunk, SearchType};

    fn output(text: &str) -> PipelineOutput {
        vec![RetrievedChunk { text: text.to_string(), metadata: ChunkMetadata::default(), score: 1.0, search_type: SearchType::Hybrid }]
    }

    #[test]
    fn key_normalizes_case_and_whitespace() {
        assert_eq!(cache_key("  How do Webhooks work? "), cache_key("how do webhooks work?"));
        assert_ne!(cache_key("webhooks"), cache_key("web hooks"));
        assert_eq!(cache_key("x").len(), 64);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = ResponseCacheConfig { max_size: 0, ..Default::default() };
        assert!(matches!(ResponseCache::new(config, None), Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn disabled_cache_is_inert() {
        let cache = ResponseCache::new(ResponseCacheConfig::default(), None).unwrap();
        cache.set_enabled(false);
        cache.set("q", output("a")).await;
        assert!(cache.is_empty());
        cache.set_enabled(true);
        cache.set("q", output("a")).await;
        assert_eq!(cache.get("Q ").await, Some(output("a")));
        cache.clear();
        assert!(cache.get("q").await.is_none());
    }
}
