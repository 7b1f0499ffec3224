//! Tag frequencies over query sets, per stratum and overall.

use std::collections::{BTreeMap, HashMap};

use crate::types::Query;

/// Tags that say nothing about popularity and are left out of counts.
const IGNORED_TAG_MARKERS: [&str; 2] = ["CareerStation", ":Thing"];

pub type Frequencies = HashMap<String, usize>;

fn ignored(tag: &str) -> bool {
    IGNORED_TAG_MARKERS.iter().any(|m| tag.contains(m))
}

pub fn tag_frequencies<'a, I>(queries: I) -> Frequencies
where
    I: IntoIterator<Item = &'a Query>,
{
    let mut freqs = Frequencies::new();
    for q in queries {
        for tag in q.tags.iter().filter(|t| !ignored(t)) {
            *freqs.entry(tag.clone()).or_insert(0) += 1;
        }
    }
    freqs
}

pub fn merge_frequencies<'a, I>(tables: I) -> Frequencies
where
    I: IntoIterator<Item = &'a Frequencies>,
{
    let mut merged = Frequencies::new();
    for table in tables {
        for (tag, n) in table {
            *merged.entry(tag.clone()).or_insert(0) += n;
        }
    }
    merged
}

/// Descending count, ties by tag.
pub fn ranked(freqs: &Frequencies) -> Vec<(&str, usize)> {
    let mut v: Vec<(&str, usize)> = freqs.iter().map(|(t, &n)| (t.as_str(), n)).collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    v
}

/// Frequencies per key (typically a stratum) and merged over all keys.
pub fn grouped<'a, K, I>(queries: I) -> (BTreeMap<K, Frequencies>, Frequencies)
where
    K: Ord + Copy,
    I: IntoIterator<Item = (K, &'a Query)>,
{
    let mut groups: BTreeMap<K, Vec<&Query>> = BTreeMap::new();
    for (key, q) in queries {
        groups.entry(key).or_default().push(q);
    }
    let per: BTreeMap<K, Frequencies> =
        groups.into_iter().map(|(k, qs)| (k, tag_frequencies(qs.into_iter()))).collect();
    let all = merge_frequencies(per.values());
    (per, all)
}
