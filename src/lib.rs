//! tagfilter_eval — ground truth and quality metrics for tag-filtered ANN search.
//!
//! Modules:
//! - `loader`: corpus and query text files.
//! - `oracle`: exact tag-overlap ground truth (brute force baseline).
//! - `postings`: uri <-> id assignments (global and per label).
//! - `merge`: per-label sub-index results merged into global ids.
//! - `eval`: recall@k, NDCG, Wilson lower bound.
//! - `ranking`: ranking, id universe and engine result files.
//! - `stratum`: query-set strata and their directory trees.
//! - `engine`: the external graph index engine behind a timeout.
//! - `convert`: binary vectors, label files and per-label partitions.
//! - `pipeline`: stratified runs over query trees.
//! - `report`: per-query scores, summaries, CSV/JSON output.
//! - `logging`: tracing setup for the binaries.

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod eval;
pub mod histogram;
pub mod loader;
pub mod logging;
pub mod merge;
pub mod metric;
pub mod oracle;
pub mod par;
pub mod pipeline;
pub mod postings;
pub mod ranking;
pub mod report;
pub mod stratum;
pub mod types;

pub use config::{EngineConfig, EvalConfig};
pub use error::{EngineError, EvalError, Result};
pub use eval::{ndcg, recall, RecallCounts};
pub use merge::{intermediate_k, merge};
pub use oracle::{compute_ground_truth, GroundTruth};
pub use postings::{LabelPartitionMapping, PostingsIndex};
pub use types::{Query, Ranking, RankingEntry, Record};
