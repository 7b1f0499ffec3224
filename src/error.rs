//! Error types for loading, ranking, merging and scoring.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Debug, Error)]
pub enum EvalError {
    /// A required input could not be opened or read.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line did not match its expected format. `line` is 1-based.
    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The query vector dimension does not match a corpus vector.
    #[error("dimension mismatch: query has {query} dims, record has {record} dims")]
    DimensionMismatch { query: usize, record: usize },

    #[error("division by zero: {what}")]
    DivideByZero { what: &'static str },

    /// A uri reached through a partition is missing from the postings index.
    #[error("uri not present in postings index: {0}")]
    UnknownUri(String),

    /// `1 / (1 - distance)` is negative for distances above 1.
    #[error("negative relevance {relevance} for distance {distance}")]
    NegativeRelevance { distance: f64, relevance: f64 },

    /// The query uses a label whose partition mapping could not be loaded.
    #[error("partition mapping for label {label} unusable: {reason}")]
    PartitionMapping { label: String, reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid stratum: {0}")]
    Stratum(String),
}

impl EvalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EvalError::Io { path: path.into(), source }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        EvalError::Parse { path: path.into(), line, message: message.into() }
    }
}

/// Failures of a single external index engine invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exceeded timeout of {timeout:?} and was killed")]
    Timeout { program: PathBuf, timeout: Duration },

    /// `code` is `None` when the process was terminated by a signal.
    #[error("{program} exited with status {code:?}: {stderr}")]
    ExitStatus {
        program: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("engine exited successfully but {0} was not written")]
    MissingOutput(PathBuf),
}
