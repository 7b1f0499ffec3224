//! Stratified runs over query trees.
//!
//! Every query is its own unit of work: a failure is recorded against that
//! query and the remaining queries still run. Shared inputs (corpus,
//! postings, partition mappings) are loaded once and only read here; a
//! partition mapping that cannot be loaded fails only the queries using
//! its label.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::convert::{partition_uri_mapping_file, query_label_file};
use crate::engine::{build_all, plan_label_searches, search_all, BuildRequest, IndexHandle, IndexService, PartitionLayout, ResultSet};
use crate::error::{EngineError, EvalError, Result};
use crate::eval::{ndcg, recall_counts, RecallCounts};
use crate::loader::read_query;
use crate::merge::merge;
use crate::oracle::compute_all;
use crate::par::parallel_map_indexed;
use crate::postings::{LabelPartitionMapping, PostingsIndex};
use crate::ranking::{batch_ids, read_batch_results, read_query_labels, read_ranking, read_ranking_ids, write_ranking, write_uri_ranking};
use crate::report::{MetricKind, Report};
use crate::stratum::{discover_queries, StratifiedQuery};
use crate::types::Record;

#[derive(Debug)]
pub struct QueryOutcome<T> {
    pub query: StratifiedQuery,
    pub result: Result<T>,
}

/// Location of a query's file under another tree with the same strata.
pub fn mirrored(root: &Path, q: &StratifiedQuery) -> PathBuf {
    root.join(q.stratum.rel_path()).join(&q.name)
}

/// Computes ground truth for every query under `queries_root` and writes
/// it to the same relative path under `out_root`. With `postings` the
/// files hold `<global_id>=<distance>`, otherwise `<uri>=<distance>`.
/// `depth` keeps only the nearest matches. Returns the number of matches
/// written per query.
pub fn generate_ground_truth(
    corpus: &[Record],
    postings: Option<&PostingsIndex>,
    queries_root: &Path,
    out_root: &Path,
    depth: Option<usize>,
    threads: usize,
) -> Result<Vec<QueryOutcome<usize>>> {
    let found = discover_queries(queries_root)?;
    info!(queries = found.len(), records = corpus.len(), "computing ground truth");

    // loaded queries hold a placeholder until their ground truth is written
    let mut outcomes: Vec<Result<usize>> = Vec::with_capacity(found.len());
    let mut loaded = Vec::new();
    let mut slots = Vec::new();
    for (i, q) in found.iter().enumerate() {
        match read_query(&q.path) {
            Ok(query) => {
                loaded.push(query);
                slots.push(i);
                outcomes.push(Ok(0));
            }
            Err(e) => outcomes.push(Err(e)),
        }
    }

    for (slot, gt) in slots.into_iter().zip(compute_all(&loaded, corpus, threads)) {
        let written = gt.and_then(|mut gt| {
            if let Some(d) = depth {
                gt.truncate(d);
            }
            let out = mirrored(out_root, &found[slot]);
            match postings {
                Some(p) => write_ranking(&out, &gt.to_ranking(p)?)?,
                None => write_uri_ranking(&out, gt.iter())?,
            }
            Ok(gt.len())
        });
        outcomes[slot] = written;
    }
    Ok(zip_outcomes(found, outcomes))
}

fn zip_outcomes<T>(queries: Vec<StratifiedQuery>, results: Vec<Result<T>>) -> Vec<QueryOutcome<T>> {
    queries
        .into_iter()
        .zip(results)
        .map(|(query, result)| {
            if let Err(e) = &result {
                warn!(stratum = %query.stratum, query = %query.name, error = %e, "query failed");
            }
            QueryOutcome { query, result }
        })
        .collect()
}

/// Recall@k of predicted rankings against ground-truth rankings. Truth
/// is cut to `truth_depth` entries when given.
pub fn recall_tree(
    predicted_root: &Path,
    truth_root: &Path,
    k: usize,
    truth_depth: Option<usize>,
    threads: usize,
) -> Result<Report> {
    let queries = discover_queries(truth_root)?;
    let counts = parallel_map_indexed(&queries, threads, |q, _| -> Result<RecallCounts> {
        let truth = read_ranking_ids(&q.path, truth_depth)?;
        let predicted = read_ranking_ids(&mirrored(predicted_root, q), Some(k))?;
        Ok(recall_counts(&predicted, &truth))
    });

    let mut report = Report::new(MetricKind::Recall, k);
    for QueryOutcome { query, result } in zip_outcomes(queries, counts) {
        if let Err(e) = result.and_then(|c| report.push_recall(query.stratum, &query.name, c)) {
            report.push_failure(query.stratum, &query.name, &e);
        }
    }
    Ok(report)
}

/// NDCG of predicted rankings against ground-truth rankings over a fixed
/// id universe.
pub fn ndcg_tree(
    predicted_root: &Path,
    truth_root: &Path,
    universe: &[u64],
    truth_depth: Option<usize>,
    threads: usize,
) -> Result<Report> {
    let queries = discover_queries(truth_root)?;
    let scores = parallel_map_indexed(&queries, threads, |q, _| {
        let mut truth = read_ranking(&q.path)?;
        if let Some(d) = truth_depth {
            truth.truncate(d);
        }
        let predicted = read_ranking(&mirrored(predicted_root, q))?;
        ndcg(&truth, &predicted, universe)
    });

    let mut report = Report::new(MetricKind::Ndcg, truth_depth.unwrap_or(0));
    for QueryOutcome { query, result } in zip_outcomes(queries, scores) {
        match result {
            Ok(v) => report.push(query.stratum, &query.name, v),
            Err(e) => report.push_failure(query.stratum, &query.name, &e),
        }
    }
    Ok(report)
}

/// Where the multi-index recall run finds its inputs.
#[derive(Clone, Debug)]
pub struct MultiIndexInputs {
    /// Tree of `<query>.bin` files with `<query>_labels.txt` beside them.
    pub queries_root: PathBuf,
    /// Single-index results: `<stratum>/<query>result_L<depth>.csv`.
    pub baseline_root: PathBuf,
    /// Per-label results: `<stratum>/<query>/<label>/result_L<depth>.csv`.
    pub label_results_root: PathBuf,
    /// Directory with `label_<label>_uri_mapping.txt` files.
    pub partition_dir: PathBuf,
    pub l_search: usize,
}

fn query_stem(q: &StratifiedQuery) -> &str {
    q.name.strip_suffix(".bin").unwrap_or(&q.name)
}

/// Query vector files of a query tree.
pub fn discover_query_bins(root: &Path) -> Result<Vec<StratifiedQuery>> {
    Ok(discover_queries(root)?.into_iter().filter(|q| q.name.ends_with(".bin")).collect())
}

/// Partition mappings of every label a run uses. A label whose mapping
/// cannot be read is kept as unusable, so only the queries that need it
/// fail.
#[derive(Debug, Default)]
pub struct PartitionMappings {
    loaded: HashMap<String, LabelPartitionMapping>,
    unusable: HashMap<String, String>,
}

impl PartitionMappings {
    pub fn load<'a, I>(partition_dir: &Path, labels: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let unique: BTreeSet<&String> = labels.into_iter().collect();
        let mut out = PartitionMappings::default();
        for label in unique {
            match LabelPartitionMapping::read(&partition_uri_mapping_file(partition_dir, label)) {
                Ok(m) => {
                    out.loaded.insert(label.clone(), m);
                }
                Err(e) => {
                    warn!(%label, error = %e, "partition mapping unusable");
                    out.unusable.insert(label.clone(), e.to_string());
                }
            }
        }
        out
    }

    pub fn mappings(&self) -> &HashMap<String, LabelPartitionMapping> {
        &self.loaded
    }

    /// Fails on the first of `labels` whose mapping could not be loaded.
    pub fn require(&self, labels: &[String]) -> Result<()> {
        match labels.iter().find_map(|l| self.unusable.get(l).map(|r| (l, r))) {
            Some((label, reason)) => {
                Err(EvalError::PartitionMapping { label: label.clone(), reason: reason.clone() })
            }
            None => Ok(()),
        }
    }

    pub fn unusable_labels(&self) -> impl Iterator<Item = &str> {
        self.unusable.keys().map(String::as_str)
    }
}

/// Recall of the single-index baseline against the merged per-label
/// results, which serve as the local ground truth.
pub fn multi_index_recall(
    inputs: &MultiIndexInputs,
    postings: &PostingsIndex,
    k: usize,
    threads: usize,
) -> Result<Report> {
    let mut report = Report::new(MetricKind::Recall, k);
    let mut work: Vec<(StratifiedQuery, Vec<String>)> = Vec::new();
    for q in discover_query_bins(&inputs.queries_root)? {
        match read_query_labels(&query_label_file(&q.path)) {
            Ok(labels) => work.push((q, labels)),
            Err(e) => {
                warn!(stratum = %q.stratum, query = %q.name, error = %e, "query failed");
                report.push_failure(q.stratum, query_stem(&q), &e);
            }
        }
    }

    let mappings = PartitionMappings::load(&inputs.partition_dir, work.iter().flat_map(|(_, l)| l));
    let unusable: Vec<&str> = mappings.unusable_labels().collect();
    if !unusable.is_empty() {
        warn!(labels = ?unusable, "queries using these labels will fail");
    }
    let result_file = ResultSet::file_name(inputs.l_search);

    let counts = parallel_map_indexed(&work, threads, |(q, labels), _| -> Result<RecallCounts> {
        mappings.require(labels)?;
        let stem = query_stem(q);
        let stratum_dir = q.stratum.rel_path();

        let baseline_file = inputs.baseline_root.join(&stratum_dir).join(format!("{stem}{result_file}"));
        let predicted = batch_ids(&read_batch_results(&baseline_file)?, Some(k));

        let mut per_label: HashMap<String, Vec<u64>> = HashMap::with_capacity(labels.len());
        for label in labels {
            let file = inputs.label_results_root.join(&stratum_dir).join(stem).join(label).join(&result_file);
            per_label.insert(label.clone(), batch_ids(&read_batch_results(&file)?, None));
        }
        let truth = merge(labels, &per_label, mappings.mappings(), postings, k)?;
        Ok(recall_counts(&predicted, &truth))
    });

    let queries = work.into_iter().map(|(q, _)| q).collect();
    for QueryOutcome { query, result } in zip_outcomes(queries, counts) {
        let name = query_stem(&query).to_string();
        if let Err(e) = result.and_then(|c| report.push_recall(query.stratum, &name, c)) {
            report.push_failure(query.stratum, &name, &e);
        }
    }
    Ok(report)
}

/// Outcome of one (query, label) engine search.
#[derive(Debug)]
pub struct LabelSearch {
    pub query: StratifiedQuery,
    pub label: String,
    pub result: std::result::Result<ResultSet, EngineError>,
}

/// Searches every label of every query in `queries_root`, writing to
/// `<result_root>/<stratum>/<query>/<label>/`. Queries whose label file
/// cannot be read are returned as errors; every (query, label) search
/// succeeds or fails on its own.
pub fn search_label_indexes<S: IndexService>(
    service: &S,
    layout: &PartitionLayout,
    queries_root: &Path,
    result_root: &Path,
    k: usize,
    threads: usize,
) -> Result<(Vec<LabelSearch>, Vec<QueryOutcome<()>>)> {
    let queries = discover_query_bins(queries_root)?;
    let mut planned = Vec::new();
    let mut failed = Vec::new();

    for q in queries {
        let label_file = query_label_file(&q.path);
        let plan = read_query_labels(&label_file).and_then(|labels| {
            let result_dir = result_root.join(q.stratum.rel_path()).join(query_stem(&q));
            plan_label_searches(layout, &q.path, &label_file, &labels, k, &result_dir)
        });
        match plan {
            Ok(reqs) => planned.extend(reqs.into_iter().map(|(label, req)| (q.clone(), label, req))),
            Err(e) => failed.push(QueryOutcome { query: q, result: Err(e) }),
        }
    }

    let requests: Vec<_> = planned.iter().map(|(_, _, req)| req.clone()).collect();
    info!(searches = requests.len(), "running label searches");
    let results = search_all(service, &requests, threads);
    let searches = planned
        .into_iter()
        .zip(results)
        .map(|((query, label, _), result)| LabelSearch { query, label, result })
        .collect();
    Ok((searches, failed))
}

/// Builds one index per `label_<id>.bin` partition in `partition_dir`
/// into `<index_root>/label_<id>/`.
pub fn build_label_indexes<S: IndexService>(
    service: &S,
    partition_dir: &Path,
    index_root: &Path,
    threads: usize,
) -> Result<Vec<(BuildRequest, std::result::Result<IndexHandle, EngineError>)>> {
    let mut requests = Vec::new();
    let mut entries: Vec<PathBuf> = fs::read_dir(partition_dir)
        .map_err(|e| EvalError::io(partition_dir, e))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in entries {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        if path.extension().and_then(|e| e.to_str()) != Some("bin") || !stem.starts_with("label_") {
            continue;
        }
        requests.push(BuildRequest {
            base_bin_file: path.clone(),
            base_label_file: path.with_extension("txt"),
            index_dir: index_root.join(stem),
        });
    }
    info!(partitions = requests.len(), "building label indexes");
    let results = build_all(service, &requests, threads);
    Ok(requests.into_iter().zip(results).collect())
}
