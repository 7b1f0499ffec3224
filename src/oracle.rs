//! Exact, brute-force ground truth for tag-filtered queries.
//!
//! A record is a valid match when its tags overlap the query's tags. All
//! matches are returned, ascending by exact euclidean distance, with ties
//! in corpus order. No depth cutoff is applied here; callers truncate.

use tracing::debug;

use crate::error::Result;
use crate::metric;
use crate::par::parallel_map_indexed;
use crate::postings::PostingsIndex;
use crate::types::{sort_by_distance, Query, Ranking, RankingEntry, Record};

#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub uri: String,
    pub distance: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroundTruth {
    pub matches: Vec<Match>,
}

impl GroundTruth {
    pub fn len(&self) -> usize { self.matches.len() }
    pub fn is_empty(&self) -> bool { self.matches.is_empty() }

    pub fn truncate(&mut self, k: usize) {
        self.matches.truncate(k);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.matches.iter().map(|m| (m.uri.as_str(), m.distance))
    }

    /// Translates uris to global ids, keeping order and distances.
    pub fn to_ranking(&self, postings: &PostingsIndex) -> Result<Ranking> {
        self.matches
            .iter()
            .map(|m| postings.global_id(&m.uri).map(|id| RankingEntry::new(id, m.distance)))
            .collect()
    }
}

pub fn compute_ground_truth(query: &Query, corpus: &[Record]) -> Result<GroundTruth> {
    let mut matches = Vec::new();
    for record in corpus {
        if !record.overlaps(&query.tags) {
            continue;
        }
        let distance = metric::euclidean(&query.embedding, &record.embedding)?;
        matches.push(Match { uri: record.uri.clone(), distance });
    }
    sort_by_distance(&mut matches, |m| m.distance);
    debug!(query = %query.uri, matches = matches.len(), "ground truth computed");
    Ok(GroundTruth { matches })
}

/// Ground truth for many queries. Each query succeeds or fails on its own;
/// output order follows `queries`.
pub fn compute_all(queries: &[Query], corpus: &[Record], threads: usize) -> Vec<Result<GroundTruth>> {
    parallel_map_indexed(queries, threads, |q, _| compute_ground_truth(q, corpus))
}
