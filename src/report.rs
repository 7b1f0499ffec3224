//! Per-query scores grouped by stratum, with CSV and JSON output.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{EvalError, Result};
use crate::eval::{wilson_lower_bound, RecallCounts};
use crate::stratum::Stratum;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Recall,
    Ndcg,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Recall => "recall",
            MetricKind::Ndcg => "ndcg",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct QueryScore {
    pub stratum: Stratum,
    pub query: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<RecallCounts>,
}

/// A query whose evaluation failed; kept so the rest of the run continues.
#[derive(Clone, Debug, Serialize)]
pub struct QueryFailure {
    pub stratum: Stratum,
    pub query: String,
    pub error: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct StratumSummary {
    pub stratum: Stratum,
    pub queries: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Wilson 95% lower bound over pooled hits, recall only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lb95: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub metric: MetricKind,
    pub k: usize,
    pub scores: Vec<QueryScore>,
    pub failures: Vec<QueryFailure>,
}

/// Formats a score, optionally with a decimal comma for spreadsheet import.
pub fn format_value(v: f64, decimal_comma: bool) -> String {
    let s = format!("{v:.6}");
    if decimal_comma { s.replace('.', ",") } else { s }
}

impl Report {
    pub fn new(metric: MetricKind, k: usize) -> Self {
        Self { metric, k, scores: Vec::new(), failures: Vec::new() }
    }

    pub fn push(&mut self, stratum: Stratum, query: impl Into<String>, value: f64) {
        self.scores.push(QueryScore { stratum, query: query.into(), value, counts: None });
    }

    pub fn push_recall(&mut self, stratum: Stratum, query: impl Into<String>, counts: RecallCounts) -> Result<f64> {
        let value = counts.recall()?;
        self.scores.push(QueryScore { stratum, query: query.into(), value, counts: Some(counts) });
        Ok(value)
    }

    pub fn push_failure(&mut self, stratum: Stratum, query: impl Into<String>, error: &EvalError) {
        self.failures.push(QueryFailure { stratum, query: query.into(), error: error.to_string() });
    }

    pub fn summary(&self) -> Vec<StratumSummary> {
        let mut groups: BTreeMap<Stratum, Vec<&QueryScore>> = BTreeMap::new();
        for s in &self.scores {
            groups.entry(s.stratum).or_default().push(s);
        }
        groups
            .into_iter()
            .map(|(stratum, rows)| {
                let n = rows.len();
                let values = rows.iter().map(|r| r.value);
                let mean = values.clone().sum::<f64>() / n as f64;
                let min = values.clone().fold(f64::INFINITY, f64::min);
                let max = values.fold(f64::NEG_INFINITY, f64::max);
                let pooled = rows.iter().filter_map(|r| r.counts).fold(RecallCounts::default(), |acc, c| {
                    RecallCounts { hits: acc.hits + c.hits, possible: acc.possible + c.possible }
                });
                let lb95 = match self.metric {
                    MetricKind::Recall => wilson_lower_bound(pooled.hits, pooled.possible, 1.96).ok(),
                    MetricKind::Ndcg => None,
                };
                StratumSummary { stratum, queries: n, mean, min, max, lb95 }
            })
            .collect()
    }

    /// One row per query. With `decimal_comma` the separator becomes `;`.
    pub fn write_csv(&self, path: &Path, decimal_comma: bool) -> Result<()> {
        let sep = if decimal_comma { ';' } else { ',' };
        let mut w = create(path)?;
        let io = |e| EvalError::io(path, e);
        writeln!(w, "stratum{sep}query{sep}metric{sep}value").map_err(io)?;
        for s in &self.scores {
            writeln!(w, "{}{sep}{}{sep}{}{sep}{}", s.stratum, s.query, self.metric.name(), format_value(s.value, decimal_comma))
                .map_err(io)?;
        }
        w.flush().map_err(io)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct Out<'a> {
            report: &'a Report,
            summary: Vec<StratumSummary>,
        }
        let body = serde_json::to_vec_pretty(&Out { report: self, summary: self.summary() })
            .map_err(|e| EvalError::Config(format!("serialising report: {e}")))?;
        let mut w = create(path)?;
        w.write_all(&body).and_then(|_| w.flush()).map_err(|e| EvalError::io(path, e))
    }

    /// Console table in the layout of the sweep tools.
    pub fn print_summary(&self, decimal_comma: bool) {
        println!("{:<32} {:>8} {:>10} {:>10} {:>10} {:>10}", "stratum", "queries", "mean", "min", "max", "lb95");
        for s in self.summary() {
            println!(
                "{:<32} {:>8} {:>10} {:>10} {:>10} {:>10}",
                s.stratum.to_string(),
                s.queries,
                format_value(s.mean, decimal_comma),
                format_value(s.min, decimal_comma),
                format_value(s.max, decimal_comma),
                s.lb95.map_or_else(|| "-".to_string(), |v| format_value(v, decimal_comma)),
            );
        }
        if !self.failures.is_empty() {
            println!("{} queries failed", self.failures.len());
        }
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
    }
    File::create(path).map(BufWriter::new).map_err(|e| EvalError::io(path, e))
}
