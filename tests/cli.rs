use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

#[test]
fn prints_version() {
    let exe = env!("CARGO_BIN_EXE_reel-tui");
    let output = Command::new(exe)
        .arg("--version")
        .output()
        .expect("run reel-tui --version");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout utf8");
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "stdout was: {}",
        stdout.trim()
    );
}

#[test]
fn prints_help() {
    let exe = env!("CARGO_BIN_EXE_reel-tui");
    let output = Command::new(exe)
        .arg("--help")
        .output()
        .expect("run reel-tui --help");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout utf8");
    assert!(stdout.contains("Reel-TUI"));
    assert!(stdout.contains("--version"));
    assert!(stdout.contains("--ephemeral"));
}

#[test]
fn lists_catalog() {
    Command::cargo_bin("reel-tui")
        .expect("binary")
        .arg("--catalog")
        .assert()
        .success()
        .stdout(predicate::str::contains("wowfinalfinal1"))
        .stdout(predicate::str::contains("TRENDING"))
        .stdout(predicate::str::contains("wowfinalfinal4"));
}

#[test]
fn rejects_unknown_arguments() {
    Command::cargo_bin("reel-tui")
        .expect("binary")
        .arg("--bogus")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown argument --bogus"));
}

#[test]
fn config_flag_needs_a_path() {
    Command::cargo_bin("reel-tui")
        .expect("binary")
        .arg("--config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--config requires a path"));
}
