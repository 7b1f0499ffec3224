//! Bidirectional uri <-> dense id maps.
//!
//! Both the global postings file and each label's partition mapping file
//! hold one uri per line; the 0-based line position is the id. The maps are
//! built once and never mutated afterwards.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::{EvalError, Result};
use crate::loader::open;

/// Dense bijection between ids `0..len` and uris.
#[derive(Clone, Debug, Default)]
pub struct IdMap {
    uris: Vec<String>,
    ids: HashMap<String, u64>,
}

impl IdMap {
    /// Builds from uris in id order. Duplicate uris break the bijection and
    /// are rejected.
    pub fn from_uris<I, S>(uris: I) -> std::result::Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = IdMap::default();
        for uri in uris {
            map.push(uri.into())?;
        }
        Ok(map)
    }

    fn push(&mut self, uri: String) -> std::result::Result<u64, String> {
        let id = self.uris.len() as u64;
        if let Some(prev) = self.ids.insert(uri.clone(), id) {
            return Err(format!("duplicate uri {uri:?} (first at id {prev})"));
        }
        self.uris.push(uri);
        Ok(id)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let mut map = IdMap::default();
        for (i, line) in open(path)?.lines().enumerate() {
            let line = line.map_err(|e| EvalError::io(path, e))?;
            let uri = line.trim();
            if uri.is_empty() {
                return Err(EvalError::parse(path, i + 1, "empty uri line"));
            }
            map.push(uri.to_string()).map_err(|m| EvalError::parse(path, i + 1, m))?;
        }
        Ok(map)
    }

    pub fn len(&self) -> usize { self.uris.len() }
    pub fn is_empty(&self) -> bool { self.uris.is_empty() }

    pub fn uri(&self, id: u64) -> Option<&str> {
        self.uris.get(usize::try_from(id).ok()?).map(String::as_str)
    }

    pub fn id(&self, uri: &str) -> Option<u64> {
        self.ids.get(uri).copied()
    }
}

/// The canonical global entity id space.
#[derive(Clone, Debug, Default)]
pub struct PostingsIndex(IdMap);

impl PostingsIndex {
    pub fn new(map: IdMap) -> Self { Self(map) }

    pub fn read(path: &Path) -> Result<Self> {
        IdMap::read(path).map(Self)
    }

    /// Every uri referenced downstream must be globally known, so a miss
    /// is an error rather than an `Option`.
    pub fn global_id(&self, uri: &str) -> Result<u64> {
        self.0.id(uri).ok_or_else(|| EvalError::UnknownUri(uri.to_string()))
    }

    pub fn uri(&self, global_id: u64) -> Option<&str> { self.0.uri(global_id) }

    /// Every global id, ascending. Serves as an NDCG id universe.
    pub fn ids(&self) -> impl Iterator<Item = u64> { 0..self.0.len() as u64 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// One label's local id space. Local ids are only meaningful together
/// with the label they came from.
#[derive(Clone, Debug, Default)]
pub struct LabelPartitionMapping(IdMap);

impl LabelPartitionMapping {
    pub fn new(map: IdMap) -> Self { Self(map) }

    pub fn read(path: &Path) -> Result<Self> {
        IdMap::read(path).map(Self)
    }

    pub fn uri(&self, local_id: u64) -> Option<&str> { self.0.uri(local_id) }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_insertion_order() {
        let m = IdMap::from_uris(["x", "y", "z"]).unwrap();
        assert_eq!(m.id("y"), Some(1));
        assert_eq!(m.uri(2), Some("z"));
        assert_eq!(m.uri(3), None);
        assert_eq!(m.id("w"), None);
    }

    #[test]
    fn duplicate_uri_is_rejected() {
        assert!(IdMap::from_uris(["x", "y", "x"]).is_err());
    }

    #[test]
    fn postings_miss_is_unknown_uri() {
        let p = PostingsIndex::new(IdMap::from_uris(["a"]).unwrap());
        assert_eq!(p.global_id("a").unwrap(), 0);
        assert!(matches!(p.global_id("b"), Err(EvalError::UnknownUri(u)) if u == "b"));
    }

    #[test]
    fn postings_ids_cover_every_row() {
        let p = PostingsIndex::new(IdMap::from_uris(["a", "b", "c"]).unwrap());
        assert_eq!(p.ids().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(PostingsIndex::default().ids().count(), 0);
    }
}
