//! Query strata: (tag diversity) x (tag popularity percentile).
//!
//! Queries live in `<root>/<diversity>/<percentile>/<query>`; the stratum
//! is parsed from the two directory names once and then carried with the
//! query as an explicit key.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Diversity {
    Homogeneous,
    Heterogeneous,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Percentile {
    #[serde(rename = "10th-percentile")]
    P10,
    #[serde(rename = "50th-percentile")]
    P50,
    #[serde(rename = "90th-percentile")]
    P90,
}

impl Diversity {
    pub const ALL: [Diversity; 2] = [Diversity::Homogeneous, Diversity::Heterogeneous];

    pub fn dir_name(self) -> &'static str {
        match self {
            Diversity::Homogeneous => "homogeneous",
            Diversity::Heterogeneous => "heterogeneous",
        }
    }
}

impl Percentile {
    pub const ALL: [Percentile; 3] = [Percentile::P10, Percentile::P50, Percentile::P90];

    pub fn dir_name(self) -> &'static str {
        match self {
            Percentile::P10 => "10th-percentile",
            Percentile::P50 => "50th-percentile",
            Percentile::P90 => "90th-percentile",
        }
    }
}

impl FromStr for Diversity {
    type Err = EvalError;
    fn from_str(s: &str) -> Result<Self> {
        Diversity::ALL
            .into_iter()
            .find(|d| d.dir_name() == s)
            .ok_or_else(|| EvalError::Stratum(format!("unknown diversity {s:?}")))
    }
}

impl FromStr for Percentile {
    type Err = EvalError;
    fn from_str(s: &str) -> Result<Self> {
        Percentile::ALL
            .into_iter()
            .find(|p| p.dir_name() == s)
            .ok_or_else(|| EvalError::Stratum(format!("unknown percentile {s:?}")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stratum {
    pub diversity: Diversity,
    pub percentile: Percentile,
}

impl Stratum {
    pub fn new(diversity: Diversity, percentile: Percentile) -> Self {
        Self { diversity, percentile }
    }

    pub fn all() -> impl Iterator<Item = Stratum> {
        Diversity::ALL
            .into_iter()
            .flat_map(|d| Percentile::ALL.into_iter().map(move |p| Stratum::new(d, p)))
    }

    /// Relative directory of this stratum under a query or result root.
    pub fn rel_path(&self) -> PathBuf {
        Path::new(self.diversity.dir_name()).join(self.percentile.dir_name())
    }
}

impl fmt::Display for Stratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.diversity.dir_name(), self.percentile.dir_name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StratifiedQuery {
    pub stratum: Stratum,
    /// File name of the query inside its stratum directory.
    pub name: String,
    pub path: PathBuf,
}

fn sorted_entries(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| EvalError::io(dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| EvalError::io(dir, e))?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

fn is_dir(entry: &fs::DirEntry) -> bool {
    entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
}

/// All query files under `root`, ordered by stratum then file name.
/// Non-directories at the stratum levels are skipped; unknown stratum
/// directory names are an error.
pub fn discover_queries(root: &Path) -> Result<Vec<StratifiedQuery>> {
    let mut out = Vec::new();
    for d in sorted_entries(root)?.into_iter().filter(is_dir) {
        let diversity: Diversity = d.file_name().to_string_lossy().parse()?;
        for p in sorted_entries(&d.path())?.into_iter().filter(is_dir) {
            let percentile: Percentile = p.file_name().to_string_lossy().parse()?;
            let stratum = Stratum::new(diversity, percentile);
            for q in sorted_entries(&p.path())? {
                if !q.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                out.push(StratifiedQuery {
                    stratum,
                    name: q.file_name().to_string_lossy().into_owned(),
                    path: q.path(),
                });
            }
        }
    }
    out.sort_by(|a, b| (a.stratum, &a.name).cmp(&(b.stratum, &b.name)));
    Ok(out)
}
