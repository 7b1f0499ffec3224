//! Merging per-label search results into one globally identified set.
//!
//! Each label has its own sub-index whose results carry label-local ids.
//! The merger gives every matching label the same quota, translates local
//! ids to uris through the label's partition mapping and uris to global ids
//! through the postings index.
//!
//! The merged sequence is not deduplicated: an entity carrying several of
//! the query's labels may appear once per label. Its length can exceed `k`
//! (quota rounding) or fall short of it (unmapped local ids are dropped).

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{EvalError, Result};
use crate::postings::{LabelPartitionMapping, PostingsIndex};
use crate::types::RankingEntry;

/// Per-label depth `ceil(k / labels)`, so that `labels * quota >= k`.
pub fn intermediate_k(k: usize, labels: usize) -> Result<usize> {
    if labels == 0 {
        return Err(EvalError::DivideByZero { what: "intermediate_k with no query labels" });
    }
    Ok(k.div_ceil(labels))
}

/// Anything carrying a label-local id: ranked entries from a ranking file or
/// bare ids from an engine batch result file.
pub trait LocalHit {
    fn local_id(&self) -> u64;
}

impl LocalHit for u64 {
    fn local_id(&self) -> u64 { *self }
}

impl LocalHit for RankingEntry {
    fn local_id(&self) -> u64 { self.id }
}

/// A local result that had no entry in its label's partition mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedEntry {
    pub label: String,
    pub local_id: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Merged {
    pub ids: Vec<u64>,
    pub dropped: Vec<DroppedEntry>,
    pub quota: usize,
}

/// Merges per-label local rankings into global ids.
///
/// Labels are visited in `query_labels` order and each label's list is
/// used as given (already distance sorted upstream). Every query label
/// needs both a result list (possibly empty) and a partition mapping.
pub fn merge_detailed<H: LocalHit>(
    query_labels: &[String],
    per_label_results: &HashMap<String, Vec<H>>,
    per_label_mapping: &HashMap<String, LabelPartitionMapping>,
    postings: &PostingsIndex,
    k: usize,
) -> Result<Merged> {
    let quota = intermediate_k(k, query_labels.len())?;
    let mut merged = Merged { quota, ..Merged::default() };

    for label in query_labels {
        let results = per_label_results
            .get(label)
            .ok_or_else(|| EvalError::Config(format!("no search results for label {label}")))?;
        let mapping = per_label_mapping
            .get(label)
            .ok_or_else(|| EvalError::Config(format!("no partition mapping for label {label}")))?;

        for hit in results.iter().take(quota) {
            let local_id = hit.local_id();
            let Some(uri) = mapping.uri(local_id) else {
                merged.dropped.push(DroppedEntry { label: label.clone(), local_id });
                continue;
            };
            merged.ids.push(postings.global_id(uri)?);
        }
        debug!(%label, quota, merged = merged.ids.len(), "label merged");
    }

    if !merged.dropped.is_empty() {
        warn!(dropped = merged.dropped.len(), kept = merged.ids.len(), "local ids missing from partition mappings");
    }
    Ok(merged)
}

/// [`merge_detailed`] reduced to the merged global id sequence.
pub fn merge<H: LocalHit>(
    query_labels: &[String],
    per_label_results: &HashMap<String, Vec<H>>,
    per_label_mapping: &HashMap<String, LabelPartitionMapping>,
    postings: &PostingsIndex,
    k: usize,
) -> Result<Vec<u64>> {
    merge_detailed(query_labels, per_label_results, per_label_mapping, postings, k).map(|m| m.ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::IdMap;

    fn labels(ls: &[&str]) -> Vec<String> {
        ls.iter().map(|s| s.to_string()).collect()
    }

    fn local(ids: &[u64]) -> Vec<RankingEntry> {
        ids.iter().enumerate().map(|(i, &id)| RankingEntry::new(id, i as f64)).collect()
    }

    fn partition(uris: &[&str]) -> LabelPartitionMapping {
        LabelPartitionMapping::new(IdMap::from_uris(uris.iter().copied()).unwrap())
    }

    #[test]
    fn quota_covers_k() {
        for l in 1..20 {
            for k in 0..200 {
                let q = intermediate_k(k, l).unwrap();
                assert!(l * q >= k);
                assert!(q == 0 || l * (q - 1) < k);
            }
        }
        assert!(intermediate_k(10, 0).is_err());
    }

    #[test]
    fn two_label_overlap_scenario() {
        let postings = PostingsIndex::new(IdMap::from_uris(["W", "X", "Y"]).unwrap());
        let results = HashMap::from([
            ("tag1".to_string(), local(&[0, 1])),
            ("tag2".to_string(), local(&[0, 1])),
        ]);
        // tag2's partition only materialises local id 0
        let mappings = HashMap::from([
            ("tag1".to_string(), partition(&["X", "Y"])),
            ("tag2".to_string(), partition(&["Y"])),
        ]);
        let m = merge_detailed(&labels(&["tag1", "tag2"]), &results, &mappings, &postings, 3).unwrap();
        assert_eq!(m.quota, 2);
        assert_eq!(m.ids, vec![1, 2, 2]);
        assert_eq!(m.dropped, vec![DroppedEntry { label: "tag2".into(), local_id: 1 }]);
    }

    #[test]
    fn each_label_contributes_at_most_quota() {
        let postings = PostingsIndex::new(IdMap::from_uris(["a", "b", "c", "d", "e", "f"]).unwrap());
        let results = HashMap::from([
            ("l1".to_string(), local(&[0, 1, 2])),
            ("l2".to_string(), local(&[0, 1, 2])),
        ]);
        let mappings = HashMap::from([
            ("l1".to_string(), partition(&["a", "b", "c"])),
            ("l2".to_string(), partition(&["d", "e", "f"])),
        ]);
        let ids = merge(&labels(&["l1", "l2"]), &results, &mappings, &postings, 4).unwrap();
        assert_eq!(ids, vec![0, 1, 3, 4]);
    }

    #[test]
    fn label_order_decides_truncation_order() {
        let postings = PostingsIndex::new(IdMap::from_uris(["a", "b"]).unwrap());
        let results = HashMap::from([("l1".to_string(), local(&[0])), ("l2".to_string(), local(&[0]))]);
        let mappings = HashMap::from([("l1".to_string(), partition(&["a"])), ("l2".to_string(), partition(&["b"]))]);
        let ab = merge(&labels(&["l1", "l2"]), &results, &mappings, &postings, 2).unwrap();
        let ba = merge(&labels(&["l2", "l1"]), &results, &mappings, &postings, 2).unwrap();
        assert_eq!(ab, vec![0, 1]);
        assert_eq!(ba, vec![1, 0]);
    }

    #[test]
    fn unknown_global_uri_is_fatal() {
        let postings = PostingsIndex::new(IdMap::from_uris(["a"]).unwrap());
        let results = HashMap::from([("l1".to_string(), local(&[0]))]);
        let mappings = HashMap::from([("l1".to_string(), partition(&["zzz"]))]);
        let err = merge(&labels(&["l1"]), &results, &mappings, &postings, 1).unwrap_err();
        assert!(matches!(err, EvalError::UnknownUri(u) if u == "zzz"));
    }

    #[test]
    fn missing_label_results_are_an_error() {
        let postings = PostingsIndex::new(IdMap::from_uris(["a"]).unwrap());
        let results = HashMap::from([("l1".to_string(), vec![0u64])]);
        let mappings = HashMap::from([("l1".to_string(), partition(&["a"])), ("l2".to_string(), partition(&["a"]))]);
        assert!(merge(&labels(&["l1", "l2"]), &results, &mappings, &postings, 2).is_err());
        let ids = merge(&labels(&["l1"]), &results, &mappings, &postings, 2).unwrap();
        assert_eq!(ids, vec![0]);
    }
}
