//! Binary-level tests for the non-interactive entry points.

use assert_cmd::Command;
use predicates::prelude::*;

fn slack_shell() -> Command {
    let mut cmd = Command::cargo_bin("slack-shell").unwrap();
    cmd.env_remove("SLACK_TOKEN")
        .env_remove("SLACK_APP_TOKEN")
        .env_remove("SLACK_SHELL_CONFIG")
        .env_remove("SLACK_SHELL_THEME");
    cmd
}

#[test]
fn test_help() {
    slack_shell()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--demo"))
        .stdout(predicate::str::contains("init-config"));
}

#[test]
fn test_version() {
    slack_shell()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_completions() {
    slack_shell()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("slack-shell"));
}

#[test]
fn test_unknown_completion_shell() {
    slack_shell()
        .args(["completions", "nushell"])
        .assert()
        .failure();
}

#[test]
fn test_init_config_writes_sample_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    slack_shell()
        .arg("init-config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[notifications]"));

    slack_shell()
        .arg("init-config")
        .arg(&path)
        .assert()
        .code(5)
        .stderr(predicate::str::contains("already exists"));

    slack_shell()
        .args(["init-config", "--force"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn test_missing_token_fails_before_terminal_setup() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "debug = false\n").unwrap();

    slack_shell()
        .arg("--config")
        .arg(&config)
        .arg("--log-file")
        .arg(dir.path().join("slack-shell.log"))
        .assert()
        .code(5)
        .stderr(predicate::str::contains("slack_token not found"));
}

#[test]
fn test_missing_explicit_config() {
    let dir = tempfile::tempdir().unwrap();
    slack_shell()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("--log-file")
        .arg(dir.path().join("slack-shell.log"))
        .assert()
        .failure();
}
