//! Integration tests for the `mino` CLI binary.
//!
//! Everything here runs offline: argument parsing, config management,
//! device ids, and the error paths taken before any network call.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `mino` binary with env isolation.
///
/// Clears every `MINO_*` variable the binary reads and points the
/// platform directories at `home`.
fn mino_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("mino");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("MINO_PROFILE")
        .env_remove("MINO_CONFIG")
        .env_remove("MINO_SID")
        .env_remove("MINO_PASSWORD")
        .env_remove("MINO_DEFAULT_PROFILE")
        .env_remove("RUST_LOG");
    cmd
}

/// A scratch home plus a config file path inside it.
fn setup() -> (TempDir, PathBuf) {
    let home = TempDir::new().unwrap();
    let config = home.path().join("mino.toml");
    (home, config)
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let (home, _) = setup();
    let output = mino_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let (home, _) = setup();
    mino_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("Amino")
            .and(predicate::str::contains("login"))
            .and(predicate::str::contains("run"))
            .and(predicate::str::contains("device")),
    );
}

#[test]
fn test_version_flag() {
    let (home, _) = setup();
    mino_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mino"));
}

#[test]
fn test_unknown_subcommand() {
    let (home, _) = setup();
    mino_cmd(home.path())
        .arg("dance")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let (home, _) = setup();
    mino_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let (home, _) = setup();
    mino_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let (home, config) = setup();
    mino_cmd(home.path())
        .args(["config", "path", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("mino.toml"));
}

#[test]
fn test_config_init_then_show() {
    let (home, config) = setup();
    mino_cmd(home.path())
        .args(["config", "init", "--email", "bot@example.com", "--prefix", "$"])
        .args(["--profile", "main", "--config"])
        .arg(&config)
        .assert()
        .success();

    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains("bot@example.com"));
    assert!(written.contains("default_profile = \"main\""));

    mino_cmd(home.path())
        .args(["config", "profiles", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("main *"));
}

#[test]
fn test_config_show_redacts_secrets() {
    let (home, config) = setup();
    std::fs::write(
        &config,
        "default_profile = \"main\"\n\n[profiles.main]\nemail = \"bot@example.com\"\npassword = \"hunter2\"\n",
    )
    .unwrap();

    mino_cmd(home.path())
        .env("MINO_CONFIG", &config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("bot@example.com")
                .and(predicate::str::contains("********"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_config_init_rejects_bad_prefix() {
    let (home, config) = setup();
    mino_cmd(home.path())
        .args(["config", "init", "--email", "bot@example.com", "--prefix", "a b"])
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2);
    assert!(!config.exists());
}

// ── Device ids ──────────────────────────────────────────────────────

#[test]
fn test_device_generate_is_deterministic_with_seed() {
    let (home, config) = setup();
    let run = || {
        let output = mino_cmd(home.path())
            .args(["device", "generate", "--seed", "bot-1", "--config"])
            .arg(&config)
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap().trim().to_owned()
    };

    let first = run();
    assert_eq!(first, run());
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()), "{first}");
    assert!(first.starts_with("19"), "{first}");
}

#[test]
fn test_device_migrate_rejects_garbage() {
    let (home, config) = setup();
    mino_cmd(home.path())
        .args(["device", "migrate", "not-hex", "--config"])
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("device_id"));
}

// ── Error paths before the network ──────────────────────────────────

#[test]
fn test_login_unknown_profile() {
    let (home, config) = setup();
    mino_cmd(home.path())
        .args(["login", "--profile", "ghost", "--config"])
        .arg(&config)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_login_without_credentials() {
    let (home, config) = setup();
    std::fs::write(&config, "default_profile = \"main\"\n\n[profiles.main]\nintents = true\n")
        .unwrap();

    mino_cmd(home.path())
        .args(["login", "--config"])
        .arg(&config)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("main"));
}

#[test]
fn test_run_rejects_bad_prefix_override() {
    let (home, config) = setup();
    std::fs::write(&config, "default_profile = \"main\"\n\n[profiles.main]\n").unwrap();

    mino_cmd(home.path())
        .args(["run", "--prefix", "a b", "--config"])
        .arg(&config)
        .assert()
        .code(2);
}
