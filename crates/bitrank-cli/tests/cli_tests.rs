//! End-to-end tests for the `bitrank` binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CORPUS: &str = r#"{"chunk_id": 1, "text": "battery lasts two days", "metadata": {"product_id": "A", "theme": "battery"}, "embedding": [1.0, 1.0]}
{"chunk_id": 2, "text": "screen scratches easily", "metadata": {"product_id": "A", "theme": "screen"}, "embedding": [1.0, -1.0]}

{"chunk_id": 3, "text": "charger stopped working", "metadata": {"product_id": "B"}, "embedding": [-1.0, -1.0]}
{"chunk_id": 3, "text": "duplicate id", "embedding": [-1.0, -1.0]}
"#;

struct Fixture {
    dir: TempDir,
    config: PathBuf,
    snapshot: PathBuf,
}

impl Fixture {
    fn new(config: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("bitrank.toml");
        std::fs::write(&config_path, config).unwrap();
        std::fs::write(dir.path().join("corpus.jsonl"), CORPUS).unwrap();
        let snapshot = dir.path().join("corpus.snap");
        Self {
            dir,
            config: config_path,
            snapshot,
        }
    }

    fn flat() -> Self {
        Self::new("[index]\ndimension = 2\n")
    }

    fn partitioned() -> Self {
        Self::new(
            "[index]\ndimension = 2\n\n[index.kind]\ntype = \"partitioned\"\npartitions = 2\nprobes = 2\nvalidation_pool = 3\n",
        )
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("bitrank").unwrap();
        cmd.env_remove("RUST_LOG")
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    fn corpus(&self) -> PathBuf {
        self.dir.path().join("corpus.jsonl")
    }

    fn ingest(&self) {
        self.cmd()
            .arg("ingest")
            .arg("--corpus")
            .arg(self.corpus())
            .arg("--out")
            .arg(&self.snapshot)
            .assert()
            .success()
            .stdout(predicate::str::contains("Ingested 3 chunks (1 rejected)"));
    }

    fn snapshot(&self) -> &Path {
        &self.snapshot
    }
}

#[test]
fn test_ingest_writes_snapshot() {
    let fx = Fixture::flat();
    fx.ingest();
    assert!(fx.snapshot().exists());
}

#[test]
fn test_query_ranks_exact_match_first() {
    let fx = Fixture::flat();
    fx.ingest();

    fx.cmd()
        .args(["query", "--embedding", "0.9,0.8", "--top-k", "2", "--snapshot"])
        .arg(fx.snapshot())
        .assert()
        .success()
        .stdout(predicate::str::contains("1. [1]"))
        .stdout(predicate::str::contains("battery lasts two days"))
        .stdout(predicate::str::contains("[3]").not());
}

#[test]
fn test_query_json_with_filter() {
    let fx = Fixture::flat();
    fx.ingest();

    let output = fx
        .cmd()
        .args(["query", "--embedding", "0.9,0.8", "--product-id", "B", "--json", "--snapshot"])
        .arg(fx.snapshot())
        .output()
        .unwrap();
    assert!(output.status.success());

    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = response["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["chunk_id"], 3);
}

#[test]
fn test_query_warns_when_pool_below_top_k() {
    let fx = Fixture::flat();
    fx.ingest();

    fx.cmd()
        .args(["query", "--embedding", "0.9,0.8", "--top-k", "3", "--pool", "1", "--snapshot"])
        .arg(fx.snapshot())
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "warning: candidate pool 1 is smaller than top_k 3",
        ));
}

#[test]
fn test_query_rejects_wrong_dimension() {
    let fx = Fixture::flat();
    fx.ingest();

    fx.cmd()
        .args(["query", "--embedding", "1,2,3", "--snapshot"])
        .arg(fx.snapshot())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Dimension mismatch"));
}

#[test]
fn test_stats() {
    let fx = Fixture::flat();
    fx.ingest();

    fx.cmd()
        .arg("stats")
        .arg("--snapshot")
        .arg(fx.snapshot())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"live\": 3"))
        .stdout(predicate::str::contains("\"kind\": \"flat\""));
}

#[test]
fn test_partitioned_reindex_and_validate() {
    let fx = Fixture::partitioned();
    fx.ingest();

    fx.cmd()
        .arg("reindex")
        .arg("--snapshot")
        .arg(fx.snapshot())
        .assert()
        .success()
        .stdout(predicate::str::contains("built 2 partitions"));

    fx.cmd()
        .args(["validate", "--queries", "3", "--pool", "3", "--snapshot"])
        .arg(fx.snapshot())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"passed\": true"))
        .stdout(predicate::str::contains("\"mean_precision\""))
        .stdout(predicate::str::contains("\"mrr\""));
}

#[test]
fn test_validate_flat_index() {
    let fx = Fixture::flat();
    fx.ingest();

    fx.cmd()
        .arg("validate")
        .arg("--snapshot")
        .arg(fx.snapshot())
        .assert()
        .success()
        .stdout(predicate::str::contains("no partitions"));
}

#[test]
fn test_missing_snapshot_fails() {
    let fx = Fixture::flat();
    fx.cmd()
        .arg("stats")
        .arg("--snapshot")
        .arg(fx.dir.path().join("absent.snap"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading snapshot"));
}

#[test]
fn test_invalid_corpus_line_fails() {
    let fx = Fixture::flat();
    let bad = fx.dir.path().join("bad.jsonl");
    std::fs::write(&bad, "{\"chunk_id\": \"x\"}\n").unwrap();

    fx.cmd()
        .arg("ingest")
        .arg("--corpus")
        .arg(&bad)
        .arg("--out")
        .arg(fx.snapshot())
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad.jsonl:1"));
}
