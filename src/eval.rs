//! Ranking quality metrics: recall, NDCG and a Wilson lower bound for
//! aggregated recall.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{EvalError, Result};
use crate::types::RankingEntry;

/// Hit counts behind a recall value; summed across queries for the
/// stratum-level Wilson bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecallCounts {
    pub hits: usize,
    pub possible: usize,
}

impl RecallCounts {
    pub fn recall(&self) -> Result<f64> {
        if self.possible == 0 {
            return Err(EvalError::DivideByZero { what: "recall against empty ground truth" });
        }
        Ok(self.hits as f64 / self.possible as f64)
    }
}

/// Set-based recall counts: distinct predicted ids found in `truth` over
/// distinct ids in `truth`. Truncate `predicted` to k before calling.
pub fn recall_counts(predicted: &[u64], truth: &[u64]) -> RecallCounts {
    let truth: HashSet<u64> = truth.iter().copied().collect();
    let found: HashSet<u64> = predicted.iter().copied().filter(|id| truth.contains(id)).collect();
    RecallCounts { hits: found.len(), possible: truth.len() }
}

/// Recall of `predicted` against `truth`. Empty truth is an error, never 0 or 1.
pub fn recall(predicted: &[u64], truth: &[u64]) -> Result<f64> {
    recall_counts(predicted, truth).recall()
}

/// Relevance of a result at `distance`: `1 / (1 - distance)`.
///
/// Only meaningful for distances below 1. At exactly 1 the division fails;
/// above 1 the value is negative and is rejected where used as a true
/// relevance.
pub fn relevance(distance: f64) -> Result<f64> {
    let denom = 1.0 + (-1.0 * distance);
    if denom == 0.0 {
        return Err(EvalError::DivideByZero { what: "relevance at distance 1" });
    }
    Ok(1.0 / denom)
}

/// NDCG of `pred` against `gt` over a fixed id universe.
///
/// Both rankings become relevance vectors indexed like `universe` (0 for
/// absent ids; ids outside the universe are ignored). The cutoff is
/// `gt.len()`: predicted entries past that count get no relevance.
pub fn ndcg(gt: &[RankingEntry], pred: &[RankingEntry], universe: &[u64]) -> Result<f64> {
    if universe.len() <= 1 {
        return Err(EvalError::Config("NDCG needs an id universe of at least two ids".into()));
    }
    let pos: HashMap<u64, usize> = universe.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let mut truth = vec![0.0f64; universe.len()];
    let mut score = vec![0.0f64; universe.len()];

    for e in gt {
        let r = relevance(e.distance)?;
        if let Some(&i) = pos.get(&e.id) {
            if r < 0.0 {
                return Err(EvalError::NegativeRelevance { distance: e.distance, relevance: r });
            }
            truth[i] = r;
        }
    }
    let k = gt.len();
    for e in pred.iter().take(k) {
        let r = relevance(e.distance)?;
        if let Some(&i) = pos.get(&e.id) {
            score[i] = r;
        }
    }

    Ok(ndcg_at_k(&truth, &score, k))
}

fn discounts(n: usize, k: usize) -> Vec<f64> {
    (0..n).map(|i| if i < k { 1.0 / ((i as f64) + 2.0).log2() } else { 0.0 }).collect()
}

/// Standard NDCG@k with linear gains. Items with equal `y_score` share
/// the average gain of their tie group. Zero ideal DCG yields 0.
pub fn ndcg_at_k(y_true: &[f64], y_score: &[f64], k: usize) -> f64 {
    debug_assert_eq!(y_true.len(), y_score.len());
    let n = y_true.len();
    let disc = discounts(n, k);

    let mut ideal: Vec<f64> = y_true.to_vec();
    ideal.sort_by(|a, b| b.total_cmp(a));
    let idcg: f64 = ideal.iter().zip(&disc).map(|(g, d)| g * d).sum();
    if idcg == 0.0 {
        return 0.0;
    }
    tie_averaged_dcg(y_true, y_score, &disc) / idcg
}

fn tie_averaged_dcg(y_true: &[f64], y_score: &[f64], disc: &[f64]) -> f64 {
    let mut order: Vec<usize> = (0..y_true.len()).collect();
    order.sort_by(|&a, &b| y_score[b].total_cmp(&y_score[a]));

    let mut dcg = 0.0;
    let mut start = 0;
    while start < order.len() {
        let s = y_score[order[start]];
        let mut end = start + 1;
        while end < order.len() && y_score[order[end]] == s {
            end += 1;
        }
        let group = &order[start..end];
        let gain = group.iter().map(|&i| y_true[i]).sum::<f64>() / group.len() as f64;
        let discount: f64 = disc[start..end].iter().sum();
        dcg += gain * discount;
        start = end;
    }
    dcg
}

/// Wilson score lower bound for a Bernoulli proportion (z = 1.96 for 95%).
pub fn wilson_lower_bound(successes: usize, trials: usize, z: f64) -> Result<f64> {
    if trials == 0 {
        return Err(EvalError::DivideByZero { what: "wilson bound with zero trials" });
    }
    let n = trials as f64;
    let phat = (successes as f64) / n;
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = phat + z2 / (2.0 * n);
    let margin = z * ((phat * (1.0 - phat) + z2 / (4.0 * n)) / n).sqrt();
    Ok((center - margin) / denom)
}
