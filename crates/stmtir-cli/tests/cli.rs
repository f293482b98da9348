use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const ANSWER: &str = r#"{
    "name": "answer",
    "kind": "external",
    "mutability": "pure",
    "return_type": {"uint": 256},
    "body": [
        {"stmt": "ann_assign", "target": "x", "annotation": {"uint": 256},
         "value": {"expr": "int", "value": 41, "typ": {"uint": 256}},
         "source_text": "x: uint256 = 41"},
        {"stmt": "aug_assign", "target": {"expr": "name", "id": "x", "typ": {"uint": 256}},
         "op": "add", "value": {"expr": "int", "value": 1, "typ": {"uint": 256}},
         "source_text": "x += 1"},
        {"stmt": "return", "value": {"expr": "name", "id": "x", "typ": {"uint": 256}},
         "is_terminus": true}
    ]
}"#;

const FALLS_OFF: &str = r#"{
    "name": "broken",
    "kind": "internal",
    "mutability": "view",
    "return_type": {"uint": 256},
    "body": [{"stmt": "pass"}]
}"#;

fn stmtir() -> Command {
    Command::cargo_bin("stmtir").unwrap()
}

fn write(dir: &TempDir, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_lower_prints_annotated_ir() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "answer.json", ANSWER);

    stmtir()
        .args(["lower", "--no-color"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains(";; function answer"))
        .stdout(predicate::str::contains(";; x += 1"))
        .stdout(predicate::str::contains("(return "));
}

#[test]
fn test_lower_json_output() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "answer.json", ANSWER);

    let output = stmtir().args(["lower", "--json"]).arg(&input).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value[0]["name"], "answer");
    assert_eq!(value[0]["body"]["value"]["op"], "seq");
}

#[test]
fn test_lowered_file_passes_check() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "answer.json", ANSWER);
    let out = dir.path().join("answer.ir");

    stmtir().arg("lower").arg(&input).arg("-o").arg(&out).assert().success();
    assert!(!fs::read_to_string(&out).unwrap().contains('\u{1b}'));

    stmtir()
        .args(["check", "-v"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("VALID").and(predicate::str::contains("INVALID").not()))
        .stdout(predicate::str::contains("nodes"));
}

#[test]
fn test_config_file_controls_emission() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "answer.json", ANSWER);
    let config = write(
        &dir,
        "config.json",
        r#"{"lowering": {"annotate_source": false}, "emit": {"include_types": true}}"#,
    );

    stmtir()
        .args(["lower", "--no-color", "--config"])
        .arg(&config)
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("<uint256>"))
        .stdout(predicate::str::contains(";; x += 1").not());
}

#[test]
fn test_lowering_fault_fails_with_trail() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "broken.json", FALLS_OFF);

    stmtir()
        .arg("lower")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to lower"))
        .stderr(predicate::str::contains("without returning"));
}

#[test]
fn test_check_rejects_unknown_operator() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "bad.ir", "(seq (jumpdest 1) pass)");

    stmtir()
        .arg("check")
        .arg(&input)
        .assert()
        .failure()
        .stdout(predicate::str::contains("INVALID"))
        .stdout(predicate::str::contains("unknown operator `jumpdest`"));
}

#[test]
fn test_missing_input_file() {
    stmtir()
        .args(["lower", "/nonexistent/stmtir/input.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
