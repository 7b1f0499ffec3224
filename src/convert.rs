//! Conversion of text records into the index engine's input files.
//!
//! Vector files are little-endian: `u32` point count, `u32` dimension, then
//! the points as row-major `f32`. Label ids are integers assigned from 1 in
//! first-seen corpus order and persisted as `<tag>=<id>` lines.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{EvalError, Result};
use crate::loader::open;
use crate::types::{Query, Record};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelDictionary {
    ids: HashMap<String, u32>,
    order: Vec<String>,
}

impl LabelDictionary {
    pub fn from_corpus(corpus: &[Record]) -> Self {
        let mut dict = LabelDictionary::default();
        for tag in corpus.iter().flat_map(|r| r.tags.iter()) {
            dict.insert(tag);
        }
        dict
    }

    fn insert(&mut self, tag: &str) -> u32 {
        if let Some(&id) = self.ids.get(tag) {
            return id;
        }
        let id = self.order.len() as u32 + 1;
        self.ids.insert(tag.to_string(), id);
        self.order.push(tag.to_string());
        id
    }

    pub fn id(&self, tag: &str) -> Option<u32> {
        self.ids.get(tag).copied()
    }

    pub fn len(&self) -> usize { self.order.len() }
    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    pub fn read(path: &Path) -> Result<Self> {
        let mut dict = LabelDictionary::default();
        for (i, line) in open(path)?.lines().enumerate() {
            let line = line.map_err(|e| EvalError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            // tags may contain '=', ids never do
            let (tag, id) = line
                .rsplit_once('=')
                .ok_or_else(|| EvalError::parse(path, i + 1, "expected `<tag>=<id>`"))?;
            let id: u32 = id.trim().parse().map_err(|_| EvalError::parse(path, i + 1, format!("invalid label id {id:?}")))?;
            dict.ids.insert(tag.to_string(), id);
            dict.order.push(tag.to_string());
        }
        Ok(dict)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut w = create(path)?;
        for tag in &self.order {
            writeln!(w, "{}={}", tag, self.ids[tag]).map_err(|e| EvalError::io(path, e))?;
        }
        w.flush().map_err(|e| EvalError::io(path, e))
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
    }
    File::create(path).map(BufWriter::new).map_err(|e| EvalError::io(path, e))
}

/// Writes `rows` as an engine vector file. All rows must share one length.
pub fn write_vectors<'a, I>(path: &Path, rows: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a [f64]>,
    I::IntoIter: ExactSizeIterator,
{
    let rows = rows.into_iter();
    let count = rows.len();
    let mut w = create(path)?;
    let io = |e| EvalError::io(path, e);

    let mut rows = rows.peekable();
    let dim = rows.peek().map_or(0, |r| r.len());
    w.write_all(&(count as u32).to_le_bytes()).map_err(io)?;
    w.write_all(&(dim as u32).to_le_bytes()).map_err(io)?;
    for row in rows {
        if row.len() != dim {
            return Err(EvalError::DimensionMismatch { query: dim, record: row.len() });
        }
        for &x in row {
            w.write_all(&(x as f32).to_le_bytes()).map_err(io)?;
        }
    }
    w.flush().map_err(io)?;
    Ok(count)
}

/// Reads an engine vector file back as `(dim, row-major values)`.
pub fn read_vectors(path: &Path) -> Result<(usize, Vec<f32>)> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|e| EvalError::io(path, e))?;
    if bytes.len() < 8 {
        return Err(EvalError::parse(path, 1, "vector file shorter than its header"));
    }
    let u32_at = |off: usize| u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]) as usize;
    let (count, dim) = (u32_at(0), u32_at(4));
    if bytes.len() != 8 + count * dim * 4 {
        return Err(EvalError::parse(path, 1, format!("expected {count}x{dim} floats, file has {} bytes", bytes.len())));
    }
    let values = bytes[8..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok((dim, values))
}

fn label_line(ids: impl Iterator<Item = u32>) -> String {
    ids.map(|id| format!("{id},")).collect()
}

/// Paths written by [`write_base_dataset`].
#[derive(Clone, Debug)]
pub struct BaseDataset {
    pub bin_file: PathBuf,
    pub label_file: PathBuf,
    pub dictionary_file: PathBuf,
    pub dictionary: LabelDictionary,
}

/// Writes `data.bin`, `labels.txt` and `label_index.txt` under `dir`.
pub fn write_base_dataset(corpus: &[Record], dir: &Path) -> Result<BaseDataset> {
    let dictionary = LabelDictionary::from_corpus(corpus);
    let bin_file = dir.join("data.bin");
    let label_file = dir.join("labels.txt");
    let dictionary_file = dir.join("label_index.txt");

    write_vectors(&bin_file, corpus.iter().map(|r| r.embedding.as_slice()))?;
    let mut w = create(&label_file)?;
    for r in corpus {
        let line = label_line(r.tags.iter().filter_map(|t| dictionary.id(t)));
        writeln!(w, "{line}").map_err(|e| EvalError::io(&label_file, e))?;
    }
    w.flush().map_err(|e| EvalError::io(&label_file, e))?;
    dictionary.write(&dictionary_file)?;

    info!(records = corpus.len(), labels = dictionary.len(), dir = %dir.display(), "base dataset written");
    Ok(BaseDataset { bin_file, label_file, dictionary_file, dictionary })
}

/// Files of one label's partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    pub label: u32,
    pub members: usize,
    pub bin_file: PathBuf,
    pub label_file: PathBuf,
    pub uri_mapping_file: PathBuf,
}

pub fn partition_uri_mapping_file(dir: &Path, label: &str) -> PathBuf {
    dir.join(format!("label_{label}_uri_mapping.txt"))
}

/// Writes one partition per tag in `tags`: the members' vectors, a label
/// file giving every member that label, and the partition's local id
/// mapping (one uri per line, line position is the local id).
pub fn write_partitions(
    corpus: &[Record],
    tags: &BTreeSet<String>,
    dictionary: &LabelDictionary,
    dir: &Path,
) -> Result<Vec<Partition>> {
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        let label = dictionary
            .id(tag)
            .ok_or_else(|| EvalError::Config(format!("tag {tag:?} has no label id")))?;
        let members: Vec<&Record> = corpus.iter().filter(|r| r.tags.contains(tag)).collect();
        let name = label.to_string();
        let p = Partition {
            label,
            members: members.len(),
            bin_file: dir.join(format!("label_{name}.bin")),
            label_file: dir.join(format!("label_{name}.txt")),
            uri_mapping_file: partition_uri_mapping_file(dir, &name),
        };

        write_vectors(&p.bin_file, members.iter().map(|r| r.embedding.as_slice()).collect::<Vec<_>>())?;
        let mut labels = create(&p.label_file)?;
        let mut uris = create(&p.uri_mapping_file)?;
        for r in &members {
            writeln!(labels, "{label}").map_err(|e| EvalError::io(&p.label_file, e))?;
            writeln!(uris, "{}", r.uri).map_err(|e| EvalError::io(&p.uri_mapping_file, e))?;
        }
        labels.flush().map_err(|e| EvalError::io(&p.label_file, e))?;
        uris.flush().map_err(|e| EvalError::io(&p.uri_mapping_file, e))?;
        out.push(p);
    }
    info!(partitions = out.len(), dir = %dir.display(), "partitions written");
    Ok(out)
}

/// Label file written next to a query vector file: `q7.bin` -> `q7_labels.txt`.
pub fn query_label_file(bin_file: &Path) -> PathBuf {
    let stem = bin_file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    bin_file.with_file_name(format!("{stem}_labels.txt"))
}

/// Writes a query as a one-point vector file plus its label file. Tags
/// unknown to the dictionary have no partition and are left out.
pub fn write_query(query: &Query, dictionary: &LabelDictionary, bin_file: &Path) -> Result<Vec<u32>> {
    let mut labels = Vec::new();
    for tag in &query.tags {
        match dictionary.id(tag) {
            Some(id) => labels.push(id),
            None => warn!(query = %query.uri, %tag, "query tag has no label id"),
        }
    }
    if labels.is_empty() {
        return Err(EvalError::Config(format!("query {} has no known labels", query.uri)));
    }
    write_vectors(bin_file, [query.embedding.as_slice()])?;
    let label_path = query_label_file(bin_file);
    let line = labels.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
    let mut w = create(&label_path)?;
    writeln!(w, "{line}").map_err(|e| EvalError::io(&label_path, e))?;
    w.flush().map_err(|e| EvalError::io(&label_path, e))?;
    Ok(labels)
}

/// Global postings file: corpus uris one per line, so a record's global id
/// is its row in `data.bin`.
pub fn write_postings(corpus: &[Record], path: &Path) -> Result<()> {
    let mut w = create(path)?;
    for r in corpus {
        writeln!(w, "{}", r.uri).map_err(|e| EvalError::io(path, e))?;
    }
    w.flush().map_err(|e| EvalError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::LabelPartitionMapping;
    use crate::ranking::read_query_labels;
    use tempfile::tempdir;

    fn corpus() -> Vec<Record> {
        vec![
            Record::new("A", ["tag1"], vec![0.0, 1.0]),
            Record::new("B", ["tag1", "tag2"], vec![1.0, 2.0]),
            Record::new("C", ["tag2"], vec![2.0, 3.0]),
        ]
    }

    #[test]
    fn dictionary_assigns_from_one_in_first_seen_order() {
        let d = LabelDictionary::from_corpus(&corpus());
        assert_eq!(d.id("tag1"), Some(1));
        assert_eq!(d.id("tag2"), Some(2));
        assert_eq!(d.id("tag3"), None);
    }

    #[test]
    fn base_dataset_files() {
        let dir = tempdir().unwrap();
        let base = write_base_dataset(&corpus(), dir.path()).unwrap();
        let (dim, values) = read_vectors(&base.bin_file).unwrap();
        assert_eq!(dim, 2);
        assert_eq!(values, vec![0.0, 1.0, 1.0, 2.0, 2.0, 3.0]);
        let labels = fs::read_to_string(&base.label_file).unwrap();
        assert_eq!(labels, "1,\n1,2,\n2,\n");
        assert_eq!(LabelDictionary::read(&base.dictionary_file).unwrap(), base.dictionary);
    }

    #[test]
    fn partitions_carry_local_id_mapping() {
        let dir = tempdir().unwrap();
        let c = corpus();
        let dict = LabelDictionary::from_corpus(&c);
        let tags: BTreeSet<String> = ["tag2".to_string()].into();
        let parts = write_partitions(&c, &tags, &dict, dir.path()).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].members, 2);
        let mapping = LabelPartitionMapping::read(&parts[0].uri_mapping_file).unwrap();
        assert_eq!(mapping.uri(0), Some("B"));
        assert_eq!(mapping.uri(1), Some("C"));
        assert_eq!(read_vectors(&parts[0].bin_file).unwrap().1.len(), 4);
    }

    #[test]
    fn query_files() {
        let dir = tempdir().unwrap();
        let dict = LabelDictionary::from_corpus(&corpus());
        let q = Query::new("q", ["tag2", "tag1", "nope"], vec![0.5, 0.5]);
        let bin = dir.path().join("q1.bin");
        assert_eq!(write_query(&q, &dict, &bin).unwrap(), vec![1, 2]);
        assert_eq!(read_query_labels(&dir.path().join("q1_labels.txt")).unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn postings_follow_corpus_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("postings.txt");
        write_postings(&corpus(), &path).unwrap();
        let p = crate::postings::PostingsIndex::read(&path).unwrap();
        assert_eq!(p.global_id("C").unwrap(), 2);
        assert_eq!(p.uri(0), Some("A"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let dir = tempdir().unwrap();
        let rows: Vec<&[f64]> = vec![&[1.0, 2.0], &[1.0]];
        assert!(write_vectors(&dir.path().join("x.bin"), rows).is_err());
    }
}
