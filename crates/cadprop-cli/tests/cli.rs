use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn cadprop() -> Command {
    Command::cargo_bin("cadprop").unwrap()
}

#[test]
fn rejects_unsupported_extension_with_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("drawing.txt");
    fs::write(&file, b"plain text").unwrap();

    cadprop()
        .arg("--dry-run")
        .arg("--project")
        .arg("P100")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("file skipped"))
        .stdout(predicate::str::contains("0/1"));
}

#[test]
fn requires_at_least_one_field() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("part.ipt");
    fs::write(&file, b"stub").unwrap();

    cadprop()
        .arg("--dry-run")
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("at least one of"));
}

#[test]
fn dry_run_writes_fields_on_seeded_documents() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("part.ipt");
    fs::write(&file, b"stub").unwrap();

    cadprop()
        .arg("--dry-run")
        .arg("--project")
        .arg("P100")
        .arg("--module")
        .arg("M7")
        .arg(&file)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("new   Project")
                .and(predicate::str::contains("new   Module"))
                .and(predicate::str::contains("1/1")),
        );
}

#[test]
fn settings_log_directory_routes_logs_to_files() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("part.ipt");
    fs::write(&file, b"stub").unwrap();

    let logs = dir.path().join("logs");
    let settings = dir.path().join("cadprop.settings.json");
    fs::write(
        &settings,
        format!(r#"{{"logDirectory":{}}}"#, serde_json::to_string(&logs).unwrap()),
    )
    .unwrap();

    cadprop()
        .arg("--dry-run")
        .arg("--settings")
        .arg(&settings)
        .arg("--project")
        .arg("P100")
        .arg(&file)
        .assert()
        .success();

    let log_files: Vec<_> = fs::read_dir(&logs)
        .unwrap()
        .map(|entry| entry.unwrap())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("cadprop_")
        })
        .collect();
    assert_eq!(log_files.len(), 1);
    let contents = fs::read_to_string(log_files[0].path()).unwrap();
    assert!(contents.contains("custom properties saved"));
}

#[test]
fn missing_file_fails() {
    cadprop()
        .arg("--dry-run")
        .arg("--project")
        .arg("P100")
        .arg("no-such-file.ipt")
        .assert()
        .failure()
        .stdout(predicate::str::contains("failed"));
}
