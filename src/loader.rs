//! Reader for the three-lines-per-record text format:
//!
//! ```text
//! <uri>
//! <space separated tags>
//! <space separated embedding values>
//! ```
//!
//! Corpus files repeat the block; query files hold exactly one.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::error::{EvalError, Result};
use crate::types::{Query, Record};

pub(crate) fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| EvalError::io(path, e))
}

pub fn read_corpus(path: &Path) -> Result<Vec<Record>> {
    let records = parse_records(open(path)?, path)?;
    debug!(path = %path.display(), records = records.len(), "corpus loaded");
    Ok(records)
}

pub fn read_query(path: &Path) -> Result<Query> {
    let mut records = parse_records(open(path)?, path)?;
    match records.len() {
        1 => Ok(records.remove(0)),
        0 => Err(EvalError::parse(path, 1, "query file holds no record")),
        n => Err(EvalError::parse(path, 4, format!("query file holds {n} records, expected one"))),
    }
}

/// Parses records from any buffered reader. `path` only labels errors.
pub fn parse_records<R: BufRead>(reader: R, path: &Path) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut uri: Option<String> = None;
    let mut tags: Option<BTreeSet<String>> = None;
    let mut last_line = 0usize;

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        last_line = line_no;
        let line = line.map_err(|e| EvalError::io(path, e))?;

        match (uri.is_some(), tags.is_some()) {
            (false, _) => {
                let trimmed = line.trim();
                // blank separators between blocks
                if trimmed.is_empty() {
                    continue;
                }
                uri = Some(trimmed.to_string());
            }
            (true, false) => {
                tags = Some(line.split_whitespace().map(str::to_string).collect());
            }
            (true, true) => {
                let embedding = parse_embedding(&line, path, line_no)?;
                if let (Some(uri), Some(tags)) = (uri.take(), tags.take()) {
                    records.push(Record { uri, tags, embedding });
                }
            }
        }
    }

    if uri.is_some() {
        return Err(EvalError::parse(path, last_line, "truncated record: expected tag and embedding lines"));
    }
    Ok(records)
}

fn parse_embedding(line: &str, path: &Path, line_no: usize) -> Result<Vec<f64>> {
    let mut v = Vec::new();
    for tok in line.split_whitespace() {
        let x = tok
            .parse::<f64>()
            .map_err(|_| EvalError::parse(path, line_no, format!("invalid embedding value {tok:?}")))?;
        v.push(x);
    }
    if v.is_empty() {
        return Err(EvalError::parse(path, line_no, "empty embedding"));
    }
    Ok(v)
}
