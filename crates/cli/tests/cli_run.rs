use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn cortex(workdir: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("cortex").expect("binary");
    cmd.current_dir(workdir)
        .env("CORTEX_EMBEDDING_MODE", "stub")
        .env_remove("CORTEX_MODEL_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn setup_project() -> tempfile::TempDir {
    let temp = tempdir().unwrap();
    let root = temp.path().join("app");
    fs::create_dir_all(root.join("src/components")).unwrap();
    fs::create_dir_all(root.join("src/services")).unwrap();
    fs::create_dir_all(root.join("node_modules/dep")).unwrap();
    fs::write(
        root.join("src/components/Button.tsx"),
        r#"import React from 'react';
import { StyleSheet, TouchableOpacity, Text } from 'react-native';

export const Button = ({ label }) => {
  return (
    <TouchableOpacity style={styles.button}>
      <Text>{label}</Text>
    </TouchableOpacity>
  );
};

const styles = StyleSheet.create({ button: { padding: 8 } });
"#,
    )
    .unwrap();
    fs::write(
        root.join("src/services/api.js"),
        r#"export async function fetchTodos() {
  const response = await fetch('/api/todos');
  return response.json();
}
"#,
    )
    .unwrap();
    fs::write(
        root.join("node_modules/dep/index.js"),
        "module.exports = 1;\n",
    )
    .unwrap();
    temp
}

#[test]
fn writes_knowledge_base_and_summary() {
    let temp = setup_project();
    let workdir = temp.path();

    cortex(workdir)
        .args(["app", "--output", "out/kb.json", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kb.json"));

    let kb: Value =
        serde_json::from_str(&fs::read_to_string(workdir.join("out/kb.json")).unwrap()).unwrap();
    assert_eq!(kb["metadata"]["project_name"], "app");
    assert_eq!(kb["metadata"]["provider"], "local-stub:all-minilm-l6-v2");
    assert_eq!(kb["metadata"]["dimension"], 384);
    assert_eq!(kb["metadata"]["stats"]["files_seen"], 2);

    let records = kb["records"].as_array().unwrap();
    assert!(!records.is_empty());
    assert_eq!(
        kb["metadata"]["total_records"].as_u64().unwrap() as usize,
        records.len()
    );
    assert!(records
        .iter()
        .all(|r| !r["file"].as_str().unwrap().contains("node_modules")));
    assert!(records
        .iter()
        .all(|r| r["embedding"].as_array().unwrap().len() == 384));
    assert!(records
        .iter()
        .any(|r| r["metadata"]["layer"] == "presentation"));

    let summary = fs::read_to_string(workdir.join("out/cortex_summary.md")).unwrap();
    assert!(summary.starts_with("# Cortex knowledge base summary"));
    assert!(summary.contains("## Layers"));
    assert!(summary.contains("No errors."));
}

#[test]
fn jsonl_format_writes_one_record_per_line() {
    let temp = setup_project();
    let workdir = temp.path();

    cortex(workdir)
        .args([
            "app",
            "--output",
            "kb.json",
            "--format",
            "jsonl",
            "--no-vectors",
            "--no-summary",
            "--quiet",
        ])
        .assert()
        .success();

    assert!(!workdir.join("kb.json").exists());
    assert!(!workdir.join("cortex_summary.md").exists());
    let text = fs::read_to_string(workdir.join("kb.jsonl")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(!lines.is_empty());
    for line in lines {
        let record: Value = serde_json::from_str(line).unwrap();
        assert!(record["id"].as_str().unwrap().contains(':'));
        assert!(record.get("embedding").is_none());
    }
}

#[test]
fn missing_source_fails() {
    let temp = tempdir().unwrap();

    cortex(temp.path())
        .args(["does-not-exist", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist"));

    assert!(!temp.path().join("cortex_knowledge_base.json").exists());
}

#[test]
fn config_file_is_picked_up_from_workdir() {
    let temp = setup_project();
    let workdir = temp.path();
    fs::write(
        workdir.join("cortex.toml"),
        "[walker]\nextensions = [\"js\"]\n",
    )
    .unwrap();

    cortex(workdir)
        .args(["app", "--quiet"])
        .assert()
        .success();

    let kb: Value = serde_json::from_str(
        &fs::read_to_string(workdir.join("cortex_knowledge_base.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(kb["metadata"]["stats"]["files_seen"], 1);
    let records = kb["records"].as_array().unwrap();
    assert!(records
        .iter()
        .all(|r| r["file"].as_str().unwrap().ends_with(".js")));
}

#[test]
fn invalid_config_is_rejected_before_writing() {
    let temp = setup_project();
    let workdir = temp.path();
    fs::write(
        workdir.join("bad.toml"),
        "[chunking]\nmax_chunk_size = 10\n",
    )
    .unwrap();

    cortex(workdir)
        .args(["app", "--config", "bad.toml", "--quiet"])
        .assert()
        .failure();

    assert!(!workdir.join("cortex_knowledge_base.json").exists());
}

#[test]
fn strict_mode_fails_on_processing_errors() {
    let temp = setup_project();
    let workdir = temp.path();
    fs::write(workdir.join("app/src/blob.js"), b"\x00\x01\x02binary").unwrap();

    cortex(workdir)
        .args(["app", "--quiet"])
        .assert()
        .success();

    cortex(workdir)
        .args(["app", "--strict", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("processing errors"));

    let summary = fs::read_to_string(workdir.join("cortex_summary.md")).unwrap();
    assert!(summary.contains("`src/blob.js` [read]"));
}
