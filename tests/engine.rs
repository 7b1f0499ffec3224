#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tagfilter_eval::engine::{run_with_timeout, IndexService, PartitionLayout, UngCli, BUILD_BIN, SEARCH_BIN};
use tagfilter_eval::pipeline::{build_label_indexes, search_label_indexes};
use tagfilter_eval::{EngineConfig, EngineError};
use tempfile::tempdir;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn put(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

const FAKE_SEARCH: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --result_path_prefix) out="$2"; shift 2 ;;
    --Lsearch) shift; depths="$*"; break ;;
    *) shift ;;
  esac
done
for l in $depths; do
  printf 'query_id,ids\n0,0 1\n' > "${out}result_L${l}.csv"
done
"#;

fn engine(bin_dir: &Path) -> UngCli {
    UngCli::new(EngineConfig {
        bin_dir: bin_dir.to_path_buf(),
        l_search: vec![1000, 2000],
        timeout_secs: 30,
        ..EngineConfig::default()
    })
}

#[test]
fn non_zero_exit_carries_code_and_stderr() {
    let dir = tempdir().unwrap();
    let prog = script(dir.path(), "fail", "echo boom >&2\nexit 3");
    match run_with_timeout(&prog, &[], Duration::from_secs(10)) {
        Err(EngineError::ExitStatus { code, stderr, .. }) => {
            assert_eq!(code, Some(3));
            assert_eq!(stderr, "boom");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn background_grandchild_does_not_hold_up_success() {
    let dir = tempdir().unwrap();
    let prog = script(dir.path(), "detach", "sleep 30 &\nexit 0");
    let start = Instant::now();
    assert!(run_with_timeout(&prog, &[], Duration::from_secs(10)).is_ok());
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn failure_with_background_grandchild_keeps_stderr() {
    let dir = tempdir().unwrap();
    let prog = script(dir.path(), "detach_fail", "sleep 30 &\necho boom >&2\nexit 2");
    let start = Instant::now();
    match run_with_timeout(&prog, &[], Duration::from_secs(10)) {
        Err(EngineError::ExitStatus { code, stderr, .. }) => {
            assert_eq!(code, Some(2));
            assert_eq!(stderr, "boom");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn slow_engine_is_killed_at_timeout() {
    let dir = tempdir().unwrap();
    let prog = script(dir.path(), "slow", "exec sleep 30");
    let start = Instant::now();
    let err = run_with_timeout(&prog, &[], Duration::from_millis(200)).unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }));
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn missing_program_is_a_spawn_error() {
    let dir = tempdir().unwrap();
    let err = run_with_timeout(&dir.path().join("nope"), &[], Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, EngineError::Spawn { .. }));
}

#[test]
fn search_without_result_files_is_missing_output() {
    let dir = tempdir().unwrap();
    let bins = dir.path().join("bins");
    fs::create_dir_all(&bins).unwrap();
    script(&bins, SEARCH_BIN, "exit 0");

    let layout = PartitionLayout {
        base_bin_file: dir.path().join("data.bin"),
        base_label_file: dir.path().join("labels.txt"),
        gt_file: dir.path().join("gt.bin"),
        index_root: dir.path().join("indexes"),
    };
    let queries = dir.path().join("queries");
    put(&queries.join("homogeneous/10th-percentile/q1.bin"), "");
    put(&queries.join("homogeneous/10th-percentile/q1_labels.txt"), "4\n");

    let (searches, unplanned) =
        search_label_indexes(&engine(&bins), &layout, &queries, &dir.path().join("out"), 10, 1).unwrap();
    assert!(unplanned.is_empty());
    assert_eq!(searches.len(), 1);
    assert!(matches!(searches[0].result, Err(EngineError::MissingOutput(_))));
}

#[test]
fn label_searches_write_one_result_set_per_label() {
    let dir = tempdir().unwrap();
    let bins = dir.path().join("bins");
    fs::create_dir_all(&bins).unwrap();
    script(&bins, SEARCH_BIN, FAKE_SEARCH);

    let layout = PartitionLayout {
        base_bin_file: dir.path().join("data.bin"),
        base_label_file: dir.path().join("labels.txt"),
        gt_file: dir.path().join("gt.bin"),
        index_root: dir.path().join("indexes"),
    };
    let queries = dir.path().join("queries");
    put(&queries.join("homogeneous/10th-percentile/q1.bin"), "");
    put(&queries.join("homogeneous/10th-percentile/q1_labels.txt"), "1,2\n");
    // label file missing: planned as a failure, not searched
    put(&queries.join("homogeneous/10th-percentile/q2.bin"), "");

    let out = dir.path().join("out");
    let (searches, unplanned) = search_label_indexes(&engine(&bins), &layout, &queries, &out, 10, 2).unwrap();
    assert_eq!(unplanned.len(), 1);
    assert_eq!(unplanned[0].query.name, "q2.bin");

    assert_eq!(searches.iter().map(|s| s.label.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
    for s in &searches {
        let set = s.result.as_ref().unwrap();
        assert_eq!(set.result_dir, out.join("homogeneous/10th-percentile/q1").join(&s.label));
        assert_eq!(set.load(1000).unwrap()[0].ids, vec![0, 1]);
        assert!(set.path(2000).is_some());
    }
}

#[test]
fn builds_one_index_per_partition() {
    let dir = tempdir().unwrap();
    let bins = dir.path().join("bins");
    fs::create_dir_all(&bins).unwrap();
    script(&bins, BUILD_BIN, "exit 0");

    let parts = dir.path().join("partitions");
    put(&parts.join("label_1.bin"), "");
    put(&parts.join("label_1.txt"), "1\n");
    put(&parts.join("label_1_uri_mapping.txt"), "a\n");
    put(&parts.join("label_2.bin"), "");
    put(&parts.join("label_2.txt"), "2\n");

    let cli = engine(&bins);
    let built = build_label_indexes(&cli, &parts, &dir.path().join("indexes"), 1).unwrap();
    assert_eq!(built.len(), 2);
    for (req, res) in &built {
        let handle = res.as_ref().unwrap();
        assert_eq!(handle.index_dir, req.index_dir);
        assert!(handle.index_dir.is_dir());
        assert_eq!(req.base_label_file, req.base_bin_file.with_extension("txt"));
    }
    assert!(built[0].0.index_dir.ends_with("label_1"));

    // the trait is usable directly as well
    assert!(cli.build(&built[1].0).is_ok());
}
