//! CLI end-to-end tests
//!
//! Tests for the mediamix command-line interface that do not need ffmpeg.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the mediamix binary
#[allow(deprecated)]
fn mediamix_cmd() -> Command {
    let mut cmd = Command::cargo_bin("mediamix").unwrap();
    cmd.env_remove("PORT").env_remove("MEDIAMIX_CONFIG");
    cmd
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = mediamix_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = mediamix_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mediamix"));
}

#[test]
fn test_cli_combine_help_lists_mode() {
    let mut cmd = mediamix_cmd();
    cmd.args(["combine", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--mode"));
}

#[test]
fn test_cli_combine_rejects_unknown_mode() {
    let mut cmd = mediamix_cmd();
    cmd.args(["combine", "a.mp4", "b.mp3", "--mode", "sepia"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sepia"));
}

#[test]
fn test_cli_validate_default_config() {
    let mut cmd = mediamix_cmd();
    cmd.arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_cli_validate_reports_warnings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"engine": {"video_crf": 60}}"#).unwrap();

    let mut cmd = mediamix_cmd();
    cmd.arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("video_crf"));
}

#[test]
fn test_cli_validate_malformed_config_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();

    let mut cmd = mediamix_cmd();
    cmd.arg("validate").arg(&path).assert().failure();
}

#[test]
fn test_cli_sweep_empty_output_dir() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("output");
    fs::create_dir_all(&output).unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        serde_json::json!({"storage": {"output_dir": output}}).to_string(),
    )
    .unwrap();

    let mut cmd = mediamix_cmd();
    cmd.arg("--config")
        .arg(&path)
        .arg("sweep")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleaned up 0 old files"));
}
