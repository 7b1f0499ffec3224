//! Run configuration: defaults, optional JSON file, environment overrides.
//!
//! Command-line flags are applied on top by the binaries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::metric::DistFn;

/// Parameters forwarded to the external index engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `build_UNG_index` and `search_UNG_index`.
    pub bin_dir: PathBuf,
    pub data_type: String,
    pub dist_fn: DistFn,
    pub num_threads: usize,
    pub max_degree: usize,
    pub l_build: usize,
    pub alpha: f64,
    pub num_cross_edges: usize,
    pub build_scenario: String,
    pub search_scenario: String,
    pub num_entry_points: usize,
    pub l_search: Vec<usize>,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from("./Unified-Navigating-Graph/build/apps"),
            data_type: "float".into(),
            dist_fn: DistFn::L2,
            num_threads: 4,
            max_degree: 32,
            l_build: 100,
            alpha: 1.2,
            num_cross_edges: 6,
            build_scenario: "general".into(),
            search_scenario: "overlap".into(),
            num_entry_points: 16,
            l_search: vec![1000, 2000, 3000],
            timeout_secs: 3600,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub k: usize,
    /// Search depth whose result file is scored.
    pub eval_l_search: usize,
    /// Worker threads across queries.
    pub threads: usize,
    /// Write `0,5` instead of `0.5` in reports.
    pub decimal_comma: bool,
    pub log_level: String,
    pub engine: EngineConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            k: 100,
            eval_l_search: 1000,
            threads: 1,
            decimal_comma: false,
            log_level: "info".into(),
            engine: EngineConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EvalError::Config(format!("{key}={v:?} is not valid"))),
        Err(_) => Ok(None),
    }
}

impl EvalConfig {
    /// Defaults, overlaid with `path` when given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let bytes = std::fs::read(p).map_err(|e| EvalError::io(p, e))?;
                serde_json::from_slice(&bytes).map_err(|e| EvalError::Config(format!("{}: {e}", p.display())))?
            }
            None => EvalConfig::default(),
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(level) = std::env::var("TAGFILTER_LOG") {
            self.log_level = level;
        }
        if let Some(t) = env_parse::<usize>("TAGFILTER_THREADS")? {
            self.threads = t;
        }
        if let Some(t) = env_parse::<u64>("TAGFILTER_ENGINE_TIMEOUT_SECS")? {
            self.engine.timeout_secs = t;
        }
        if let Ok(dir) = std::env::var("TAGFILTER_ENGINE_BIN_DIR") {
            self.engine.bin_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(EvalError::Config("k must be > 0".into()));
        }
        if self.engine.l_search.is_empty() {
            return Err(EvalError::Config("engine.l_search must list at least one depth".into()));
        }
        if self.engine.timeout_secs == 0 {
            return Err(EvalError::Config("engine.timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_reference_pipeline() {
        let c = EvalConfig::default();
        assert_eq!(c.k, 100);
        assert_eq!(c.engine.l_search, vec![1000, 2000, 3000]);
        assert_eq!(c.engine.alpha, 1.2);
        assert_eq!(c.engine.search_scenario, "overlap");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("cfg.json");
        std::fs::write(&p, r#"{"k": 10, "engine": {"dist_fn": "IP", "l_search": [500]}}"#).unwrap();
        let bytes = std::fs::read(&p).unwrap();
        let c: EvalConfig = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(c.k, 10);
        assert_eq!(c.engine.dist_fn, DistFn::IP);
        assert_eq!(c.engine.l_search, vec![500]);
        assert_eq!(c.engine.max_degree, 32);
    }

    #[test]
    fn zero_k_is_rejected() {
        let c = EvalConfig { k: 0, ..EvalConfig::default() };
        assert!(matches!(c.validate(), Err(EvalError::Config(_))));
    }
}
