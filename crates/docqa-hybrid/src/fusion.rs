//! Rank-based score fusion of the semantic and keyword hit lists.
//!
//! A hit at zero-based rank `r` contributes `weight * max(score, 0) / (r + 1)`.
//! Raw cosine and BM25-style scores are not comparable across signals; the
//! rank penalty is what makes adding them meaningful.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use docqa_core::corpus::Corpus;
use docqa_core::types::{FusedResult, SearchHit, SearchType};

pub fn contribution(weight: f32, hit: &SearchHit) -> f32 {
    let score = if hit.score.is_finite() { hit.score.max(0.0) } else { 0.0 };
    weight.max(0.0) * score / (hit.rank as f32 + 1.0)
}

/// Descending `final_score`, then semantic rank, keyword rank and id.
pub fn compare(a: &FusedResult, b: &FusedResult) -> Ordering {
    let rank = |r: Option<usize>| r.unwrap_or(usize::MAX);
    b.final_score
        .partial_cmp(&a.final_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| rank(a.semantic_rank).cmp(&rank(b.semantic_rank)))
        .then_with(|| rank(a.keyword_rank).cmp(&rank(b.keyword_rank)))
        .then_with(|| a.id().cmp(b.id()))
}

pub struct FusionRanker {
    corpus: Arc<Corpus>,
}

impl FusionRanker {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self { corpus }
    }

    /// Ids unknown to the corpus are dropped. Repeated ids within one list
    /// count once, at their first (best) rank.
    pub fn fuse(&self, semantic: &[SearchHit], keyword: &[SearchHit], semantic_weight: f32, keyword_weight: f32) -> Vec<FusedResult> {
        let mut order: Vec<String> = Vec::new();
        let mut by_id: HashMap<String, FusedResult> = HashMap::new();

        for hit in semantic {
            let Some(chunk) = self.corpus.get(&hit.id) else { continue };
            if by_id.contains_key(&hit.id) { continue; }
            let c = contribution(semantic_weight, hit);
            order.push(hit.id.clone());
            by_id.insert(hit.id.clone(), FusedResult {
                chunk: chunk.clone(),
                semantic_score: c,
                keyword_score: 0.0,
                final_score: c,
                search_type: SearchType::Semantic,
                semantic_rank: Some(hit.rank),
                keyword_rank: None,
                rerank_score: None,
            });
        }

        for hit in keyword {
            let Some(chunk) = self.corpus.get(&hit.id) else { continue };
            let c = contribution(keyword_weight, hit);
            match by_id.get_mut(&hit.id) {
                Some(existing) if existing.keyword_rank.is_some() => {}
                Some(existing) => {
                    existing.keyword_score = c;
                    existing.keyword_rank = Some(hit.rank);
                    existing.final_score = existing.semantic_score + c;
                    existing.search_type = SearchType::Hybrid;
                }
                None => {
                    order.push(hit.id.clone());
                    by_id.insert(hit.id.clone(), FusedResult {
                        chunk: chunk.clone(),
                        semantic_score: 0.0,
                        keyword_score: c,
                        final_score: c,
                        search_type: SearchType::Keyword,
                        semantic_rank: None,
                        keyword_rank: Some(hit.rank),
                        rerank_score: None,
                    });
                }
            }
        }

        let mut fused: Vec<FusedResult> = order.into_iter().filter_map(|id| by_id.remove(&id)).collect();
        fused.sort_by(compare);
        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::types::{Chunk, ChunkMetadata, Origin};

    fn corpus(ids: &[&str]) -> Arc<Corpus> {
        let chunks = ids.iter().map(|id| Chunk { id: id.to_string(), text: format!("text {id}"), metadata: ChunkMetadata::default() }).collect();
        Arc::new(Corpus::new(chunks).unwrap())
    }

    fn hits(ids: &[&str], origin: Origin) -> Vec<SearchHit> {
        ids.iter().enumerate().map(|(rank, id)| SearchHit { id: id.to_string(), score: 1.0, rank, origin }).collect()
    }

    #[test]
    fn scores_and_search_types() {
        let ranker = FusionRanker::new(corpus(&["a", "b", "c"]));
        let fused = ranker.fuse(&hits(&["a", "b"], Origin::Semantic), &hits(&["c", "a"], Origin::Keyword), 0.6, 0.4);
        let ids: Vec<_> = fused.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(fused[0].search_type, SearchType::Hybrid);
        assert!((fused[0].final_score - (0.6 + 0.4 / 2.0)).abs() < 1e-6);
        assert_eq!(fused[1].search_type, SearchType::Keyword);
        assert!((fused[1].final_score - 0.4).abs() < 1e-6);
        assert_eq!(fused[2].search_type, SearchType::Semantic);
        assert!((fused[2].final_score - 0.3).abs() < 1e-6);
    }

    #[test]
    fn unknown_ids_and_duplicates_are_skipped() {
        let ranker = FusionRanker::new(corpus(&["a"]));
        let fused = ranker.fuse(&hits(&["ghost", "a", "a"], Origin::Semantic), &[], 1.0, 1.0);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].semantic_rank, Some(1));
    }

    #[test]
    fn negative_and_nan_scores_contribute_nothing() {
        let ranker = FusionRanker::new(corpus(&["a", "b"]));
        let sem = vec![
            SearchHit { id: "a".into(), score: -0.5, rank: 0, origin: Origin::Semantic },
            SearchHit { id: "b".into(), score: f32::NAN, rank: 1, origin: Origin::Semantic },
        ];
        let fused = ranker.fuse(&sem, &[], 0.6, 0.4);
        assert!(fused.iter().all(|r| r.final_score == 0.0));
        // equal scores fall back to semantic rank
        assert_eq!(fused[0].id(), "a");
    }
}
