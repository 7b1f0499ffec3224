//! The external graph index engine, seen as a bounded service.
//!
//! Index building and searching are delegated to the engine's command-line
//! tools. Every invocation runs under a timeout, a non-zero exit fails only
//! that invocation, and independent (query, label) searches may run in
//! parallel without affecting each other.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::merge::intermediate_k;
use crate::par::parallel_map_indexed;
use crate::ranking::{read_batch_results, BatchRow};

pub const BUILD_BIN: &str = "build_UNG_index";
pub const SEARCH_BIN: &str = "search_UNG_index";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildRequest {
    pub base_bin_file: PathBuf,
    pub base_label_file: PathBuf,
    pub index_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    /// Per-label depth passed as `--K`.
    pub k: usize,
    pub base_bin_file: PathBuf,
    pub base_label_file: PathBuf,
    pub query_bin_file: PathBuf,
    pub query_label_file: PathBuf,
    pub gt_file: PathBuf,
    pub index_dir: PathBuf,
    pub result_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexHandle {
    pub index_dir: PathBuf,
}

/// Result files of one search invocation, one per search depth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultSet {
    pub result_dir: PathBuf,
    pub files: BTreeMap<usize, PathBuf>,
}

impl ResultSet {
    pub fn file_name(l_search: usize) -> String {
        format!("result_L{l_search}.csv")
    }

    pub fn path(&self, l_search: usize) -> Option<&Path> {
        self.files.get(&l_search).map(PathBuf::as_path)
    }

    pub fn load(&self, l_search: usize) -> crate::Result<Vec<BatchRow>> {
        let path = self
            .path(l_search)
            .ok_or_else(|| EngineError::MissingOutput(self.result_dir.join(Self::file_name(l_search))))?;
        read_batch_results(path)
    }
}

pub trait IndexService: Sync {
    fn build(&self, req: &BuildRequest) -> Result<IndexHandle, EngineError>;
    fn search(&self, req: &SearchRequest) -> Result<ResultSet, EngineError>;
}

/// Directory path as a prefix the engine concatenates file names onto.
fn prefix(dir: &Path) -> String {
    let s = dir.display().to_string();
    if s.ends_with('/') { s } else { format!("{s}/") }
}

fn path_arg(p: &Path) -> String {
    p.display().to_string()
}

/// Drives the engine's build and search binaries.
#[derive(Clone, Debug)]
pub struct UngCli {
    pub cfg: EngineConfig,
}

impl UngCli {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { cfg }
    }

    pub fn build_args(&self, req: &BuildRequest) -> Vec<String> {
        let c = &self.cfg;
        vec![
            "--data_type".into(), c.data_type.clone(),
            "--dist_fn".into(), c.dist_fn.to_string(),
            "--num_threads".into(), c.num_threads.to_string(),
            "--max_degree".into(), c.max_degree.to_string(),
            "--Lbuild".into(), c.l_build.to_string(),
            "--alpha".into(), c.alpha.to_string(),
            "--base_bin_file".into(), path_arg(&req.base_bin_file),
            "--base_label_file".into(), path_arg(&req.base_label_file),
            "--index_path_prefix".into(), prefix(&req.index_dir),
            "--scenario".into(), c.build_scenario.clone(),
            "--num_cross_edges".into(), c.num_cross_edges.to_string(),
        ]
    }

    pub fn search_args(&self, req: &SearchRequest) -> Vec<String> {
        let c = &self.cfg;
        let mut args: Vec<String> = vec![
            "--data_type".into(), c.data_type.clone(),
            "--dist_fn".into(), c.dist_fn.to_string(),
            "--num_threads".into(), c.num_threads.to_string(),
            "--K".into(), req.k.to_string(),
            "--base_bin_file".into(), path_arg(&req.base_bin_file),
            "--base_label_file".into(), path_arg(&req.base_label_file),
            "--query_bin_file".into(), path_arg(&req.query_bin_file),
            "--query_label_file".into(), path_arg(&req.query_label_file),
            "--gt_file".into(), path_arg(&req.gt_file),
            "--index_path_prefix".into(), prefix(&req.index_dir),
            "--result_path_prefix".into(), prefix(&req.result_dir),
            "--scenario".into(), c.search_scenario.clone(),
            "--num_entry_points".into(), c.num_entry_points.to_string(),
            "--Lsearch".into(),
        ];
        args.extend(c.l_search.iter().map(|l| l.to_string()));
        args
    }

    fn program(&self, name: &str) -> PathBuf {
        self.cfg.bin_dir.join(name)
    }
}

fn create_dir(dir: &Path, program: &Path) -> Result<(), EngineError> {
    std::fs::create_dir_all(dir).map_err(|source| EngineError::Spawn { program: program.to_path_buf(), source })
}

impl IndexService for UngCli {
    fn build(&self, req: &BuildRequest) -> Result<IndexHandle, EngineError> {
        let program = self.program(BUILD_BIN);
        create_dir(&req.index_dir, &program)?;
        run_with_timeout(&program, &self.build_args(req), self.cfg.timeout())?;
        info!(index = %req.index_dir.display(), "index built");
        Ok(IndexHandle { index_dir: req.index_dir.clone() })
    }

    fn search(&self, req: &SearchRequest) -> Result<ResultSet, EngineError> {
        let program = self.program(SEARCH_BIN);
        create_dir(&req.result_dir, &program)?;
        run_with_timeout(&program, &self.search_args(req), self.cfg.timeout())?;

        let mut files = BTreeMap::new();
        for &l in &self.cfg.l_search {
            let path = req.result_dir.join(ResultSet::file_name(l));
            if !path.is_file() {
                return Err(EngineError::MissingOutput(path));
            }
            files.insert(l, path);
        }
        debug!(result_dir = %req.result_dir.display(), "search finished");
        Ok(ResultSet { result_dir: req.result_dir.clone(), files })
    }
}

/// Runs `program args..` and waits at most `timeout`, killing the child on
/// expiry. Non-zero exit is an error carrying the child's stderr.
pub fn run_with_timeout(program: &Path, args: &[String], timeout: Duration) -> Result<(), EngineError> {
    debug!(program = %program.display(), args = ?args, "spawning engine");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| EngineError::Spawn { program: program.to_path_buf(), source })?;

    // Drain stderr on the side so a chatty child cannot block on a full pipe.
    // A grandchild may inherit the pipe and hold it open past our child's
    // exit, so the reader is never joined; chunks arrive over a channel.
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    if let Some(mut err) = child.stderr.take() {
        std::thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match err.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EngineError::Timeout { program: program.to_path_buf(), timeout });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(source) => return Err(EngineError::Spawn { program: program.to_path_buf(), source }),
        }
    };

    if !status.success() {
        let stderr = collect_stderr(&rx, STDERR_GRACE);
        return Err(EngineError::ExitStatus {
            program: program.to_path_buf(),
            code: status.code(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(())
}

/// How long stderr keeps being collected after the engine has exited.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// Gathers stderr chunks until the writer side closes or `grace` runs out.
fn collect_stderr(rx: &mpsc::Receiver<Vec<u8>>, grace: Duration) -> String {
    let deadline = Instant::now() + grace;
    let mut buf = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                debug!("stderr still open after engine exit; truncating");
                break;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Layout of the per-label indexes and the shared base dataset.
#[derive(Clone, Debug)]
pub struct PartitionLayout {
    pub base_bin_file: PathBuf,
    pub base_label_file: PathBuf,
    pub gt_file: PathBuf,
    pub index_root: PathBuf,
}

impl PartitionLayout {
    pub fn index_dir(&self, label: &str) -> PathBuf {
        self.index_root.join(format!("label_{label}"))
    }
}

/// One search request per query label, each asking for
/// `ceil(k / labels)` results and writing under `result_dir/<label>/`.
pub fn plan_label_searches(
    layout: &PartitionLayout,
    query_bin_file: &Path,
    query_label_file: &Path,
    labels: &[String],
    k: usize,
    result_dir: &Path,
) -> crate::Result<Vec<(String, SearchRequest)>> {
    let per_label = intermediate_k(k, labels.len())?;
    Ok(labels
        .iter()
        .map(|label| {
            let req = SearchRequest {
                k: per_label,
                base_bin_file: layout.base_bin_file.clone(),
                base_label_file: layout.base_label_file.clone(),
                query_bin_file: query_bin_file.to_path_buf(),
                query_label_file: query_label_file.to_path_buf(),
                gt_file: layout.gt_file.clone(),
                index_dir: layout.index_dir(label),
                result_dir: result_dir.join(label),
            };
            (label.clone(), req)
        })
        .collect())
}

/// Runs independent searches across `threads` workers. Each request gets
/// its own result; a failure is logged and returned, never propagated to
/// the other requests.
pub fn search_all<S: IndexService>(
    service: &S,
    requests: &[SearchRequest],
    threads: usize,
) -> Vec<Result<ResultSet, EngineError>> {
    parallel_map_indexed(requests, threads, |req, _| {
        let res = service.search(req);
        if let Err(e) = &res {
            warn!(result_dir = %req.result_dir.display(), error = %e, "engine search failed");
        }
        res
    })
}

/// Builds indexes across `threads` workers, one result per request.
pub fn build_all<S: IndexService>(
    service: &S,
    requests: &[BuildRequest],
    threads: usize,
) -> Vec<Result<IndexHandle, EngineError>> {
    parallel_map_indexed(requests, threads, |req, _| {
        let res = service.build(req);
        if let Err(e) = &res {
            warn!(index = %req.index_dir.display(), error = %e, "engine build failed");
        }
        res
    })
}
