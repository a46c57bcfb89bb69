use std::cmp::Ordering;
use std::collections::HashSet;

use docqa_core::types::FusedResult;

/// Promotes the best result of each category to the head of the list.
///
/// Pass 1 walks the score-sorted input and emits the first result of every
/// unseen category with `boost` added to its `final_score`. Pass 2 appends the
/// remaining results by descending score (stable, so same-score results keep
/// their input order). The output is not re-sorted: a boosted result stays
/// ahead of every unboosted one even when its raw score is lower.
#[derive(Debug, Clone, Copy)]
pub struct DiversityBooster {
    boost: f32,
}

impl DiversityBooster {
    pub fn new(boost: f32) -> Self {
        Self { boost }
    }

    pub fn diversify(&self, fused: Vec<FusedResult>) -> Vec<FusedResult> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut head = Vec::new();
        let mut rest = Vec::new();
        for mut r in fused {
            if seen.insert(r.category().to_string()) {
                r.final_score += self.boost;
                head.push(r);
            } else {
                rest.push(r);
            }
        }
        rest.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(Ordering::Equal));
        head.extend(rest);
        head
    }
}
