use std::fs;
use std::path::Path;

use tagfilter_eval::pipeline::{multi_index_recall, MultiIndexInputs};
use tagfilter_eval::postings::{IdMap, PostingsIndex};
use tempfile::tempdir;

fn put(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

#[test]
fn merged_label_results_score_the_baseline() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let stratum = "homogeneous/50th-percentile";

    let partitions = root.join("partitions");
    put(&partitions.join("label_1_uri_mapping.txt"), "X\nY\n");
    put(&partitions.join("label_2_uri_mapping.txt"), "Y\n");

    let queries = root.join("queries");
    put(&queries.join(stratum).join("q1.bin"), "");
    put(&queries.join(stratum).join("q1_labels.txt"), "1,2\n");
    put(&queries.join(stratum).join("q2.bin"), "");
    put(&queries.join(stratum).join("q2_labels.txt"), "2\n");

    let label_results = root.join("label_results");
    let header = "query_id,ids\n";
    put(&label_results.join(stratum).join("q1/1/result_L1000.csv"), &format!("{header}0,0 1\n"));
    put(&label_results.join(stratum).join("q1/2/result_L1000.csv"), &format!("{header}0,0 1\n"));
    // q2 has no per-label results

    let baseline = root.join("baseline");
    put(&baseline.join(stratum).join("q1result_L1000.csv"), &format!("{header}0,1 2 0 1\n"));
    put(&baseline.join(stratum).join("q2result_L1000.csv"), &format!("{header}0,2\n"));

    let postings = PostingsIndex::new(IdMap::from_uris(["W", "X", "Y"]).unwrap());
    let inputs = MultiIndexInputs {
        queries_root: queries,
        baseline_root: baseline,
        label_results_root: label_results,
        partition_dir: partitions,
        l_search: 1000,
    };
    let report = multi_index_recall(&inputs, &postings, 3, 2).unwrap();

    // merged truth is [1, 2, 2]; the baseline's first three ids cover both
    assert_eq!(report.scores.len(), 1);
    assert_eq!(report.scores[0].query, "q1");
    assert_eq!(report.scores[0].value, 1.0);
    let counts = report.scores[0].counts.unwrap();
    assert_eq!((counts.hits, counts.possible), (2, 2));

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].query, "q2");
}

#[test]
fn missing_partition_mapping_fails_only_its_queries() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let stratum = "heterogeneous/10th-percentile";
    let header = "query_id,ids\n";

    let partitions = root.join("partitions");
    put(&partitions.join("label_1_uri_mapping.txt"), "a\nb\n");
    // no mapping file for label 7

    let queries = root.join("queries");
    put(&queries.join(stratum).join("q1.bin"), "");
    put(&queries.join(stratum).join("q1_labels.txt"), "1\n");
    put(&queries.join(stratum).join("q2.bin"), "");
    put(&queries.join(stratum).join("q2_labels.txt"), "7\n");

    let label_results = root.join("label_results");
    put(&label_results.join(stratum).join("q1/1/result_L1000.csv"), &format!("{header}0,1 0\n"));
    put(&label_results.join(stratum).join("q2/7/result_L1000.csv"), &format!("{header}0,0\n"));
    let baseline = root.join("baseline");
    put(&baseline.join(stratum).join("q1result_L1000.csv"), &format!("{header}0,0 1\n"));
    put(&baseline.join(stratum).join("q2result_L1000.csv"), &format!("{header}0,0\n"));

    let inputs = MultiIndexInputs {
        queries_root: queries,
        baseline_root: baseline,
        label_results_root: label_results,
        partition_dir: partitions,
        l_search: 1000,
    };
    let postings = PostingsIndex::new(IdMap::from_uris(["a", "b"]).unwrap());
    let report = multi_index_recall(&inputs, &postings, 2, 1).unwrap();

    assert_eq!(report.scores.len(), 1);
    assert_eq!(report.scores[0].query, "q1");
    assert_eq!(report.scores[0].value, 1.0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].query, "q2");
    assert!(report.failures[0].error.contains("label 7"));
}

#[test]
fn unreadable_label_file_keeps_its_io_error() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let queries = root.join("queries");
    put(&queries.join("homogeneous/90th-percentile/q9.bin"), "");

    let inputs = MultiIndexInputs {
        queries_root: queries,
        baseline_root: root.join("baseline"),
        label_results_root: root.join("label_results"),
        partition_dir: root.join("partitions"),
        l_search: 1000,
    };
    let postings = PostingsIndex::new(IdMap::from_uris(["a"]).unwrap());
    let report = multi_index_recall(&inputs, &postings, 10, 1).unwrap();
    assert!(report.scores.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].query, "q9");
    let err = &report.failures[0].error;
    assert!(err.starts_with("i/o error on"), "{err}");
    assert!(err.contains("q9_labels.txt"), "{err}");
}
