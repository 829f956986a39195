//! End-to-end CLI tests for the archiver binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn archiver() -> Command {
    Command::cargo_bin("archiver").unwrap()
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    archiver()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Archive community-group posts"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    archiver()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("archiver"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    archiver()
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that status on a fresh collection reports zero posts.
#[test]
fn test_status_on_empty_collection() {
    let out = TempDir::new().unwrap();
    archiver()
        .args(["-q", "status", "--collection", "g1", "--output"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("g1: 0 posts"));
}

/// Test that a unit with nothing to fetch completes and exits with code 0.
#[test]
fn test_run_complete_unit_exits_zero() {
    let out = TempDir::new().unwrap();
    let units = out.path().join("units.json");
    std::fs::write(
        &units,
        r#"[{"id": "p1", "title": "Welcome", "url": "https://groups.example/p1"}]"#,
    )
    .unwrap();

    archiver()
        .args(["-q", "run", "--collection", "g1", "--units"])
        .arg(&units)
        .arg("--output")
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("p1\tcomplete"));

    assert!(out.path().join(".manifests").join("g1.json").exists());
}

/// Test that a unit left partial exits with code 2.
#[test]
fn test_run_partial_unit_exits_two() {
    let out = TempDir::new().unwrap();
    let units = out.path().join("units.json");
    std::fs::write(
        &units,
        r#"[{"id": "p2", "title": "Contact", "url": "https://groups.example/p2",
             "candidates": [{"url": "mailto:board@example.org"}]}]"#,
    )
    .unwrap();

    archiver()
        .args(["-q", "run", "--collection", "g1", "--units"])
        .arg(&units)
        .arg("--output")
        .arg(out.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains("p2\tpartial").and(predicate::str::contains("links=1")));

    archiver()
        .args(["-q", "status", "--collection", "g1", "--output"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 partial"));
}

/// Test that a corrupt manifest is fatal.
#[test]
fn test_run_with_corrupt_manifest_exits_one() {
    let out = TempDir::new().unwrap();
    let manifests = out.path().join(".manifests");
    std::fs::create_dir_all(&manifests).unwrap();
    std::fs::write(manifests.join("g1.json"), "{ not json").unwrap();
    let units = out.path().join("units.json");
    std::fs::write(&units, "[]").unwrap();

    archiver()
        .args(["-q", "run", "--collection", "g1", "--units"])
        .arg(&units)
        .arg("--output")
        .arg(out.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("g1.json"));
}

/// Test that a missing units file is reported.
#[test]
fn test_run_missing_units_file_fails() {
    let out = TempDir::new().unwrap();
    archiver()
        .args(["-q", "run", "--collection", "g1", "--units"])
        .arg(out.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("units file"));
}

/// Test that out-of-range config values are rejected before any work.
#[test]
fn test_run_rejects_invalid_config() {
    let out = TempDir::new().unwrap();
    let config = out.path().join("archiver.json");
    std::fs::write(&config, r#"{"max_folder_depth": 99}"#).unwrap();
    let units = out.path().join("units.json");
    std::fs::write(&units, "[]").unwrap();

    archiver()
        .args(["-q", "run", "--collection", "g1", "--units"])
        .arg(&units)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_folder_depth"));
}
