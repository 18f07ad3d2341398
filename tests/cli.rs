//! CLI flows against a data dir built through `ingest`.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

mod util;

fn base_cmd(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("corpus-search").unwrap();
    cmd.arg("--config")
        .arg(data_dir.join("absent-config.toml"))
        .arg("--data-dir")
        .arg(data_dir)
        .env("RUST_LOG", "warn")
        .env_remove("CORPUS_SEARCH_DATA_DIR")
        .env_remove("CORPUS_SEARCH_PAGE_SIZE")
        .env_remove("CORPUS_SEARCH_MAX_PAGE_SIZE")
        .env_remove("CORPUS_SEARCH_ENABLEMENT_TTL_SECS");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is JSON")
}

fn hit_ids(outcome: &Value) -> Vec<String> {
    let mut ids: Vec<String> = outcome["hits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

fn ingested_data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let docs_path = dir.path().join("xml.jsonl");
    let lines: Vec<String> = util::xml_documents()
        .iter()
        .map(|d| serde_json::to_string(d).unwrap())
        .collect();
    std::fs::write(&docs_path, lines.join("\n\n")).unwrap();

    let added = json_stdout(
        base_cmd(dir.path())
            .arg("ingest")
            .arg(&docs_path)
            .args(["--domain", "xml"]),
    );
    assert_eq!(added["added"], 5);
    dir
}

#[test]
fn notes_prints_both_contours() {
    let dir = TempDir::new().unwrap();
    let pattern = json_stdout(base_cmd(dir.path()).args(["notes", "C4", "D4", "Eb4"]));
    assert_eq!(pattern["absolute"], serde_json::json!([60, 62, 63]));
    assert_eq!(pattern["relative"], serde_json::json!([2, 1]));
}

#[test]
fn unknown_note_fails() {
    let dir = TempDir::new().unwrap();
    base_cmd(dir.path())
        .args(["notes", "C4", "Q9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Q9"));
}

#[test]
fn search_respects_registry_changes() {
    let dir = ingested_data_dir();

    let outcome = json_stdout(base_cmd(dir.path()).args(["search", "key=G"]));
    assert_eq!(hit_ids(&outcome), ["x1", "y1"]);
    assert_eq!(outcome["total_matched"], 2);

    base_cmd(dir.path())
        .args(["corpora", "disable", "X", "--domain", "xml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"enabled\": false"));

    let outcome = json_stdout(base_cmd(dir.path()).args(["search", "key=G"]));
    assert_eq!(hit_ids(&outcome), ["y1"]);

    base_cmd(dir.path())
        .args(["compare", "--ids", "y1,x1"])
        .assert()
        .failure();
}

#[test]
fn search_accepts_a_query_string() {
    let dir = ingested_data_dir();
    let outcome = json_stdout(
        base_cmd(dir.path()).args(["search", "--query", "edu=IF1&pageSize=1", "page=2"]),
    );
    assert_eq!(outcome["total_matched"], 3);
    assert_eq!(outcome["pagination"]["total_pages"], 3);
    assert_eq!(outcome["pagination"]["current"], 2);
}

#[test]
fn malformed_param_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    base_cmd(dir.path())
        .args(["search", "noequals"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("key=value"));
}

#[test]
fn corpora_add_and_list() {
    let dir = TempDir::new().unwrap();
    base_cmd(dir.path())
        .args(["corpora", "add", "folk", "--name", "Folk songs", "--license-url", "https://example.org"])
        .assert()
        .success();
    let listed = json_stdout(base_cmd(dir.path()).args(["corpora", "list"]));
    let records = listed.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], "Folk songs");
    assert_eq!(records[0]["enabled"], Value::Null);
}

#[test]
fn facets_report_meters_and_summaries() {
    let dir = ingested_data_dir();
    let report = json_stdout(base_cmd(dir.path()).arg("facets"));
    assert_eq!(
        report["time_signatures"],
        serde_json::json!(["2/4", "3/4", "4/4", "6/8"])
    );
    assert_eq!(report["summaries"].as_array().unwrap().len(), 2);
}
