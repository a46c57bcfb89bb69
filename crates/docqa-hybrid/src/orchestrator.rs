//! Concurrent semantic + keyword retrieval.
//!
//! The vector query and the keyword task start together and are joined; the
//! vector branch is mandatory, the keyword branch may degrade to an empty list.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use docqa_core::corpus::Corpus;
use docqa_core::error::{Error, Result};
use docqa_core::traits::{KeywordIndex, VectorIndex};
use docqa_core::types::{Filter, KeywordField, Origin, ProcessedQuery, SearchHit};

const ORIGINAL_WEIGHT: f32 = 1.0;
const EXPANDED_WEIGHT: f32 = 0.8;
const TECHNICAL_WEIGHT: f32 = 1.2;
const API_ENDPOINT_WEIGHT: f32 = 1.3;
/// Texts shorter than this are boosted (up to [`MAX_LENGTH_NORM`]), longer ones damped.
const REFERENCE_LEN: f32 = 1000.0;
const MAX_LENGTH_NORM: f32 = 1.2;

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub semantic: Vec<SearchHit>,
    pub keyword: Vec<SearchHit>,
    /// Why the keyword branch returned nothing, when it failed.
    pub keyword_error: Option<String>,
}

struct Variant {
    query: String,
    weight: f32,
    limit: usize,
    fields: Option<&'static [KeywordField]>,
}

pub struct ParallelSearchOrchestrator {
    vector: Arc<dyn VectorIndex>,
    keyword: Arc<dyn KeywordIndex>,
    corpus: Arc<Corpus>,
    filter: Filter,
    timeout: Duration,
}

impl ParallelSearchOrchestrator {
    pub fn new(vector: Arc<dyn VectorIndex>, keyword: Arc<dyn KeywordIndex>, corpus: Arc<Corpus>, filter: Filter, timeout: Duration) -> Self {
        Self { vector, keyword, corpus, filter, timeout }
    }

    pub async fn search(&self, processed: &ProcessedQuery, embedding: &[f32], max_results: usize) -> Result<SearchOutcome> {
        let filter = (!self.filter.is_empty()).then_some(&self.filter);
        let vector = tokio::time::timeout(self.timeout, self.vector.query(embedding, max_results, filter));

        let (index, corpus, query) = (Arc::clone(&self.keyword), Arc::clone(&self.corpus), processed.clone());
        let keyword_task = tokio::task::spawn_blocking(move || keyword_search(index.as_ref(), &corpus, &query, max_results));
        let keyword = tokio::time::timeout(self.timeout, keyword_task);

        let (vector, keyword) = tokio::join!(vector, keyword);

        let semantic = match vector {
            Ok(Ok(matches)) => matches
                .into_iter()
                .enumerate()
                .map(|(rank, m)| SearchHit { id: m.id, score: m.score, rank, origin: Origin::Semantic })
                .collect::<Vec<_>>(),
            Ok(Err(e)) => return Err(Error::Unavailable(format!("vector search failed: {e}"))),
            Err(_) => return Err(Error::Unavailable(format!("vector search timed out after {:?}", self.timeout))),
        };

        let (keyword, keyword_error) = match keyword {
            Ok(Ok(Ok(hits))) => (hits, None),
            Ok(Ok(Err(e))) => (Vec::new(), Some(e.to_string())),
            Ok(Err(join)) => (Vec::new(), Some(format!("keyword task aborted: {join}"))),
            Err(_) => (Vec::new(), Some(format!("keyword search timed out after {:?}", self.timeout))),
        };
        if let Some(reason) = &keyword_error {
            warn!(reason = %reason, "keyword search degraded, continuing with semantic results only");
        }
        debug!(semantic = semantic.len(), keyword = keyword.len(), "parallel search finished");
        Ok(SearchOutcome { semantic, keyword, keyword_error })
    }
}

fn variants(processed: &ProcessedQuery, max_results: usize) -> Vec<Variant> {
    let mut out = vec![Variant { query: processed.original.clone(), weight: ORIGINAL_WEIGHT, limit: max_results, fields: None }];
    if processed.expanded != processed.original {
        out.push(Variant { query: processed.expanded.clone(), weight: EXPANDED_WEIGHT, limit: max_results, fields: None });
    }
    if !processed.technical_terms.is_empty() {
        let per_term = max_results.div_ceil(processed.technical_terms.len());
        for term in &processed.technical_terms {
            out.push(Variant { query: term.clone(), weight: TECHNICAL_WEIGHT, limit: per_term, fields: None });
        }
    }
    out.push(Variant { query: processed.original.clone(), weight: API_ENDPOINT_WEIGHT, limit: max_results, fields: Some(&[KeywordField::ApiEndpoints]) });
    out
}

fn length_norm(corpus: &Corpus, id: &str) -> f32 {
    let len = corpus.get(id).map(|c| c.text.chars().count() as f32).unwrap_or(REFERENCE_LEN);
    if len == 0.0 { MAX_LENGTH_NORM } else { (REFERENCE_LEN / len).min(MAX_LENGTH_NORM) }
}

/// Run every keyword variant and merge them, keeping each id's best score.
pub fn keyword_search(index: &dyn KeywordIndex, corpus: &Corpus, processed: &ProcessedQuery, max_results: usize) -> Result<Vec<SearchHit>> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, f32> = HashMap::new();
    for variant in variants(processed, max_results) {
        let matches = index.search(&variant.query, variant.limit, variant.fields)?;
        for (rank, m) in matches.into_iter().enumerate() {
            let score = variant.weight * length_norm(corpus, &m.id) / (rank as f32 + 1.0);
            best.entry(m.id.clone())
                .and_modify(|existing| *existing = existing.max(score))
                .or_insert_with(|| {
                    order.push(m.id);
                    score
                });
        }
    }
    let mut merged: Vec<(String, f32)> = order
        .into_iter()
        .map(|id| {
            let score = best[&id];
            (id, score)
        })
        .collect();
    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(max_results);
    Ok(merged
        .into_iter()
        .enumerate()
        .map(|(rank, (id, score))| SearchHit { id, score, rank, origin: Origin::Keyword })
        .collect())
}
