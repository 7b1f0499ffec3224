//! Text formats for rankings and engine results.
//!
//! - ranking files: `<id>=<distance>` per line, ascending distance
//! - uri rankings: `<uri>=<distance>` per line (inspection output)
//! - id assignments: `<id>=<uri>` per line
//! - batch results: header line, then `<query_id>,<id> <id> ...`
//! - query label files: one line of comma separated label ids

use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use crate::error::{EvalError, Result};
use crate::loader::open;
use crate::types::{Ranking, RankingEntry};

fn split_pair<'a>(line: &'a str, path: &Path, line_no: usize) -> Result<(&'a str, &'a str)> {
    line.split_once('=')
        .ok_or_else(|| EvalError::parse(path, line_no, format!("expected `<a>=<b>`, got {line:?}")))
}

fn parse_id(tok: &str, path: &Path, line_no: usize) -> Result<u64> {
    tok.trim()
        .parse::<u64>()
        .map_err(|_| EvalError::parse(path, line_no, format!("invalid id {tok:?}")))
}

fn parse_distance(tok: &str, path: &Path, line_no: usize) -> Result<f64> {
    tok.trim()
        .parse::<f64>()
        .map_err(|_| EvalError::parse(path, line_no, format!("invalid distance {tok:?}")))
}

/// Reads a full `<id>=<distance>` ranking. Blank lines are skipped.
pub fn read_ranking(path: &Path) -> Result<Ranking> {
    let mut out = Vec::new();
    for (i, line) in open(path)?.lines().enumerate() {
        let line = line.map_err(|e| EvalError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let (id, dist) = split_pair(&line, path, i + 1)?;
        out.push(RankingEntry::new(parse_id(id, path, i + 1)?, parse_distance(dist, path, i + 1)?));
    }
    Ok(out)
}

/// Ids of a ranking file, optionally stopping after the first `k`.
pub fn read_ranking_ids(path: &Path, k: Option<usize>) -> Result<Vec<u64>> {
    let mut ids = read_ranking(path)?.into_iter().map(|e| e.id).collect::<Vec<_>>();
    if let Some(k) = k {
        ids.truncate(k);
    }
    Ok(ids)
}

pub fn write_ranking(path: &Path, ranking: &[RankingEntry]) -> Result<()> {
    write_lines(path, ranking.iter().map(|e| format!("{}={}", e.id, e.distance)))
}

/// Writes `<uri>=<distance>` lines.
pub fn write_uri_ranking<'a, I>(path: &Path, entries: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    write_lines(path, entries.into_iter().map(|(uri, d)| format!("{uri}={d}")))
}

fn write_lines<I: IntoIterator<Item = String>>(path: &Path, lines: I) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
    }
    let f = File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut w = BufWriter::new(f);
    for line in lines {
        writeln!(w, "{line}").map_err(|e| EvalError::io(path, e))?;
    }
    w.flush().map_err(|e| EvalError::io(path, e))
}

/// Ids of an `<id>=<uri>` assignment file in file order. Used as the id
/// universe for NDCG.
pub fn read_id_universe(path: &Path) -> Result<Vec<u64>> {
    let mut ids = Vec::new();
    for (i, line) in open(path)?.lines().enumerate() {
        let line = line.map_err(|e| EvalError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let (id, _uri) = split_pair(&line, path, i + 1)?;
        ids.push(parse_id(id, path, i + 1)?);
    }
    Ok(ids)
}

/// One data row of an engine batch result file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchRow {
    pub query_id: u64,
    pub ids: Vec<u64>,
}

/// Reads an engine batch result file, skipping its header line.
pub fn read_batch_results(path: &Path) -> Result<Vec<BatchRow>> {
    let mut rows = Vec::new();
    for (i, line) in open(path)?.lines().enumerate().skip(1) {
        let line_no = i + 1;
        let line = line.map_err(|e| EvalError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let (qid, ids) = line
            .split_once(',')
            .ok_or_else(|| EvalError::parse(path, line_no, "expected `<query_id>,<ids>`"))?;
        let ids = ids
            .split_whitespace()
            .map(|t| parse_id(t, path, line_no))
            .collect::<Result<Vec<_>>>()?;
        rows.push(BatchRow { query_id: parse_id(qid, path, line_no)?, ids });
    }
    Ok(rows)
}

/// Result ids across all rows in file order, stopping after `k` when given.
pub fn batch_ids(rows: &[BatchRow], k: Option<usize>) -> Vec<u64> {
    let all = rows.iter().flat_map(|r| r.ids.iter().copied());
    match k {
        Some(k) => all.take(k).collect(),
        None => all.collect(),
    }
}

/// Label list of a query, in file order.
pub fn read_query_labels(path: &Path) -> Result<Vec<String>> {
    let mut lines = open(path)?.lines();
    let first = match lines.next() {
        Some(line) => line.map_err(|e| EvalError::io(path, e))?,
        None => return Err(EvalError::parse(path, 1, "empty label file")),
    };
    let labels: Vec<String> = first
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(EvalError::parse(path, 1, "no labels"));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ranking_file_roundtrip_preserves_order() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("nested/q1");
        let r = vec![RankingEntry::new(7, 0.25), RankingEntry::new(2, 0.25), RankingEntry::new(9, 1.5)];
        write_ranking(&p, &r).unwrap();
        assert_eq!(read_ranking(&p).unwrap(), r);
        assert_eq!(read_ranking_ids(&p, Some(2)).unwrap(), vec![7, 2]);
    }

    #[test]
    fn malformed_ranking_line_names_file_and_line() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("bad");
        fs::write(&p, "1=0.5\n2:0.7\n").unwrap();
        match read_ranking(&p).unwrap_err() {
            EvalError::Parse { path, line, .. } => {
                assert_eq!(path, p);
                assert_eq!(line, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(read_ranking(&dir.path().join("nope")), Err(EvalError::Io { .. })));
    }

    #[test]
    fn batch_header_is_skipped() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("result_L1000.csv");
        fs::write(&p, "query_id,results\n0,4 5 6 \n1,7\n").unwrap();
        let rows = read_batch_results(&p).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ids, vec![4, 5, 6]);
        assert_eq!(batch_ids(&rows, Some(4)), vec![4, 5, 6, 7]);
        assert_eq!(batch_ids(&rows, Some(2)), vec![4, 5]);
    }

    #[test]
    fn query_labels_keep_file_order() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("q1_labels.txt");
        fs::write(&p, "12,3,7\n").unwrap();
        assert_eq!(read_query_labels(&p).unwrap(), vec!["12", "3", "7"]);
    }
}
