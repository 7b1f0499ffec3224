use std::cmp::Ordering;
use std::collections::BTreeSet;

/// One corpus entity: uri, its tag set and its embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub uri: String,
    pub tags: BTreeSet<String>,
    pub embedding: Vec<f64>,
}

/// Queries share the record layout; a query file holds exactly one.
pub type Query = Record;

impl Record {
    pub fn new<I, S>(uri: impl Into<String>, tags: I, embedding: Vec<f64>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { uri: uri.into(), tags: tags.into_iter().map(Into::into).collect(), embedding }
    }

    /// True when the two tag sets share at least one tag.
    pub fn overlaps(&self, tags: &BTreeSet<String>) -> bool {
        // iterate the smaller set
        let (small, large) = if self.tags.len() <= tags.len() { (&self.tags, tags) } else { (tags, &self.tags) };
        small.iter().any(|t| large.contains(t))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankingEntry {
    pub id: u64,
    pub distance: f64,
}

impl RankingEntry {
    pub fn new(id: u64, distance: f64) -> Self {
        Self { id, distance }
    }
}

/// Ascending by distance, ties in encounter order.
pub type Ranking = Vec<RankingEntry>;

#[inline]
fn by_distance(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Stable ascending sort on distance. `sort_by` is stable, so equal
/// distances keep the order they were produced in.
pub fn sort_by_distance<T>(items: &mut [T], distance: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| by_distance(distance(a), distance(b)));
}

pub fn ids(ranking: &[RankingEntry]) -> Vec<u64> {
    ranking.iter().map(|e| e.id).collect()
}
