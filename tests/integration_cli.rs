//! Integration tests for the chatvault binary
//!
//! Runs the CLI against temporary data directories and checks exit codes
//! and output.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn chatvault(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("chatvault").unwrap();
    cmd.env_remove("CHATVAULT_DATA_DIR")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(data_dir.join("absent.yaml"))
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.arg("--json").output().unwrap();
    assert!(output.status.success(), "command failed: {:?}", output);
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_invalid_config_threshold_rejected() {
    let (_temp_dir, config_path) = common::temp_config_file(
        r#"
import:
  similarity_threshold: 1.5
"#,
    );

    let mut cmd = Command::cargo_bin("chatvault").unwrap();
    cmd.arg("--config").arg(config_path).arg("stats");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("similarity_threshold"));
}

#[test]
fn test_new_add_show_round_trip() {
    let tmp = TempDir::new().unwrap();

    let created = json_output(chatvault(tmp.path()).args(["new", "--title", "CLI demo", "--tag", "cli"]));
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["title"], "CLI demo");

    chatvault(tmp.path())
        .args(["add", id.as_str(), "hello from the shell"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added"));

    let shown = json_output(chatvault(tmp.path()).args(["show", id.as_str()]));
    assert_eq!(shown["messages"].as_array().unwrap().len(), 1);
    assert_eq!(shown["messages"][0]["role"], "user");
    assert_eq!(shown["metadata"]["totalMessages"], 1);
}

#[test]
fn test_add_to_missing_session_fails() {
    let tmp = TempDir::new().unwrap();
    chatvault(tmp.path())
        .args(["add", "missing", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Session not found"));
}

#[test]
fn test_delete_missing_session_succeeds() {
    let tmp = TempDir::new().unwrap();
    let out = json_output(chatvault(tmp.path()).args(["delete", "missing"]));
    assert_eq!(out["deleted"], false);
}

#[test]
fn test_import_twice_then_search() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    let export = common::write_export(
        tmp.path(),
        "exports/greeting.md",
        "# Greeting\n**User:** hello there\n**Assistant:** hi\n",
    );
    let export = export.to_str().unwrap();

    let first = json_output(chatvault(&data).args(["import", export]));
    assert_eq!(first["imported"], 1);
    assert_eq!(first["skipped"], 0);

    let second = json_output(chatvault(&data).args(["import", export]));
    assert_eq!(second["imported"], 0);
    assert_eq!(second["skipped"], 1);

    let found = json_output(chatvault(&data).args(["search", "hello"]));
    assert_eq!(found["totalCount"], 1);
    assert_eq!(found["sessions"][0]["title"], "Greeting");
}

#[test]
fn test_backup_create_list_restore() {
    let tmp = TempDir::new().unwrap();
    for title in ["one", "two", "three"] {
        chatvault(tmp.path())
            .args(["new", "--title", title])
            .assert()
            .success();
    }

    let created = json_output(chatvault(tmp.path()).args(["backup", "create"]));
    assert_eq!(created["metadata"]["sessionCount"], 3);
    let path = created["path"].as_str().unwrap().to_string();

    let listed = json_output(chatvault(tmp.path()).args(["backup", "list"]));
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let restored = json_output(chatvault(tmp.path()).args(["backup", "restore", path.as_str()]));
    assert_eq!(restored["restored"], 3);
    assert!(restored["errors"].as_array().unwrap().is_empty());

    let stats = json_output(chatvault(tmp.path()).arg("stats"));
    assert_eq!(stats["totalSessions"], 3);
}
