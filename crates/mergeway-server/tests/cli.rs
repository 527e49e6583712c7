//! Integration tests for the mergeway binary.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn mergeway() -> Command {
    let mut cmd = Command::cargo_bin("mergeway").expect("binary exists");
    cmd.env_remove("MERGEWAY_BIND")
        .env_remove("MERGEWAY_REPOS_DIR")
        .env_remove("MERGEWAY_STATE_DIR");
    cmd
}

#[test]
fn test_help() {
    mergeway()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Serve pull requests over HTTP"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--bind"));
}

#[test]
fn test_version() {
    mergeway()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mergeway"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("mergeway.toml");
    std::fs::write(&config, "[server\nbind = ").unwrap();

    mergeway()
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("mergeway.toml"));
}

#[test]
fn test_bad_bind_flag_fails() {
    let dir = TempDir::new().unwrap();

    mergeway()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .args(["--bind", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not-an-address"));
}

#[test]
fn test_bad_bind_from_env_fails() {
    let dir = TempDir::new().unwrap();

    mergeway()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .env("MERGEWAY_BIND", "localhost:notaport")
        .assert()
        .failure()
        .stderr(predicate::str::contains("server.bind"));
}
