#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Barrier;
use docqa_core::corpus::Corpus;
use docqa_core::error::{Error, Result};
use docqa_core::traits::{EmbeddingProvider, KeywordIndex, PairScorer, PairScorerLoader, VectorIndex};
use docqa_core::types::{Chunk, ChunkMetadata, Filter, KeywordField, KeywordMatch, PipelineOutput, RetrievedChunk, SearchType, VectorMatch};

pub fn chunk(id: &str, category: &str, text: &str) -> Chunk {
    Chunk { id: id.to_string(), text: text.to_string(), metadata: ChunkMetadata { title: id.to_string(), category: category.to_string(), ..Default::default() } }
}

pub fn corpus(chunks: Vec<Chunk>) -> Arc<Corpus> {
    Arc::new(Corpus::new(chunks).expect("valid corpus"))
}

pub fn output(texts: &[&str]) -> PipelineOutput {
    texts
        .iter()
        .map(|t| RetrievedChunk { text: t.to_string(), metadata: ChunkMetadata::default(), score: 0.5, search_type: SearchType::Semantic })
        .collect()
}

/// Unit vector along `axis`, tilted toward the next axis by `tilt`.
pub fn unit(dim: usize, axis: usize, tilt: f32) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis % dim] = 1.0;
    v[(axis + 1) % dim] = tilt;
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.into_iter().map(|x| x / norm).collect()
}

/// How long a fake waits at a shared barrier before giving up.
pub const RENDEZVOUS_WAIT: Duration = Duration::from_secs(2);

pub enum VectorBehavior {
    Ranked(Vec<(String, f32)>),
    /// Answers only after the keyword branch has also reached the barrier.
    AfterBarrier(Arc<Barrier>, Vec<(String, f32)>),
    Fail,
    Hang,
}

/// Returns a scripted ranking regardless of the query vector.
pub struct ScriptedVectorIndex {
    pub behavior: VectorBehavior,
    pub calls: AtomicUsize,
    pub last_filter: Mutex<Option<Filter>>,
}

impl ScriptedVectorIndex {
    pub fn ranked(ids: &[(&str, f32)]) -> Arc<Self> {
        Self::with(VectorBehavior::Ranked(ids.iter().map(|(id, s)| (id.to_string(), *s)).collect()))
    }

    pub fn with(behavior: VectorBehavior) -> Arc<Self> {
        Arc::new(Self { behavior, calls: AtomicUsize::new(0), last_filter: Mutex::new(None) })
    }

    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl VectorIndex for ScriptedVectorIndex {
    async fn query(&self, _vector: &[f32], top_k: usize, filter: Option<&Filter>) -> Result<Vec<VectorMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_filter.lock().unwrap() = filter.cloned();
        match &self.behavior {
            VectorBehavior::Ranked(ids) => Ok(ids.iter().take(top_k).map(|(id, score)| VectorMatch { id: id.clone(), score: *score, metadata: None }).collect()),
            VectorBehavior::AfterBarrier(barrier, ids) => {
                tokio::time::timeout(RENDEZVOUS_WAIT, barrier.wait())
                    .await
                    .map_err(|_| Error::VectorIndex("keyword branch never started".into()))?;
                Ok(ids.iter().take(top_k).map(|(id, score)| VectorMatch { id: id.clone(), score: *score, metadata: None }).collect())
            }
            VectorBehavior::Fail => Err(Error::VectorIndex("connection refused".into())),
            VectorBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }
}

pub enum KeywordBehavior {
    /// Every variant query gets the same ranking.
    Ranked(Vec<String>),
    Fail,
    Panic,
}

pub struct ScriptedKeywordIndex {
    pub behavior: KeywordBehavior,
    pub queries: Mutex<Vec<(String, usize, Option<Vec<KeywordField>>)>>,
    /// Taken by the first search call, which waits there for the vector branch.
    pub rendezvous: Mutex<Option<Arc<Barrier>>>,
}

impl ScriptedKeywordIndex {
    pub fn ranked(ids: &[&str]) -> Arc<Self> {
        Self::with(KeywordBehavior::Ranked(ids.iter().map(|s| s.to_string()).collect()))
    }

    pub fn with(behavior: KeywordBehavior) -> Arc<Self> {
        Arc::new(Self { behavior, queries: Mutex::new(Vec::new()), rendezvous: Mutex::new(None) })
    }

    pub fn ranked_after(barrier: Arc<Barrier>, ids: &[&str]) -> Arc<Self> {
        let index = Self::ranked(ids);
        *index.rendezvous.lock().unwrap() = Some(barrier);
        index
    }
}

impl KeywordIndex for ScriptedKeywordIndex {
    fn search(&self, query: &str, limit: usize, fields: Option<&[KeywordField]>) -> Result<Vec<KeywordMatch>> {
        self.queries.lock().unwrap().push((query.to_string(), limit, fields.map(<[KeywordField]>::to_vec)));
        let barrier = self.rendezvous.lock().unwrap().take();
        if let Some(barrier) = barrier {
            // runs on the blocking pool, outside any async task
            let handle = tokio::runtime::Handle::current();
            handle
                .block_on(async { tokio::time::timeout(RENDEZVOUS_WAIT, barrier.wait()).await })
                .map_err(|_| Error::KeywordIndex("vector branch never started".into()))?;
        }
        match &self.behavior {
            KeywordBehavior::Ranked(ids) => Ok(ids.iter().take(limit).map(|id| KeywordMatch { id: id.clone(), score: Some(1.0) }).collect()),
            KeywordBehavior::Fail => Err(Error::KeywordIndex("index corrupted".into())),
            KeywordBehavior::Panic => panic!("keyword index blew up"),
        }
    }

    fn len(&self) -> usize { 1 }
}

/// Looks the text up in a fixed table; unknown texts fail.
#[derive(Default)]
pub struct TableEmbedder {
    pub vectors: Mutex<HashMap<String, Vec<f32>>>,
    pub calls: AtomicUsize,
}

impl TableEmbedder {
    pub fn new(entries: &[(&str, Vec<f32>)]) -> Arc<Self> {
        let e = Self::default();
        for (k, v) in entries {
            e.vectors.lock().unwrap().insert(k.to_string(), v.clone());
        }
        Arc::new(e)
    }

    pub fn insert(&self, text: &str, v: Vec<f32>) { self.vectors.lock().unwrap().insert(text.to_string(), v); }

    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors.lock().unwrap().get(text).cloned().ok_or_else(|| Error::Embedding(format!("no vector for {text:?}")))
    }
}

/// Scores a text by how many times `needle` occurs in it; can be told to fail.
pub struct CountingScorer {
    pub needle: String,
    pub fail: std::sync::atomic::AtomicBool,
    pub batches: Mutex<Vec<usize>>,
}

impl CountingScorer {
    pub fn new(needle: &str) -> Arc<Self> {
        Arc::new(Self { needle: needle.to_string(), fail: std::sync::atomic::AtomicBool::new(false), batches: Mutex::new(Vec::new()) })
    }

    pub fn set_failing(&self, fail: bool) { self.fail.store(fail, Ordering::SeqCst); }

    pub fn batch_sizes(&self) -> Vec<usize> { self.batches.lock().unwrap().clone() }
}

#[async_trait]
impl PairScorer for CountingScorer {
    async fn score_pairs(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::RerankModel("device lost".into()));
        }
        self.batches.lock().unwrap().push(texts.len());
        Ok(texts.iter().map(|t| (t.matches(self.needle.as_str()).count() as f32 / 10.0).min(1.0)).collect())
    }
}

pub struct StaticLoader {
    pub scorer: Option<Arc<CountingScorer>>,
    pub loads: AtomicUsize,
}

impl StaticLoader {
    pub fn ok(scorer: Arc<CountingScorer>) -> Arc<Self> { Arc::new(Self { scorer: Some(scorer), loads: AtomicUsize::new(0) }) }

    pub fn failing() -> Arc<Self> { Arc::new(Self { scorer: None, loads: AtomicUsize::new(0) }) }

    pub fn loads(&self) -> usize { self.loads.load(Ordering::SeqCst) }
}

#[async_trait]
impl PairScorerLoader for StaticLoader {
    async fn load(&self) -> Result<Arc<dyn PairScorer>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &self.scorer {
            Some(s) => Ok(Arc::clone(s) as Arc<dyn PairScorer>),
            None => Err(Error::RerankModel("model files missing".into())),
        }
    }
}
