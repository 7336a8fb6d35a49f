//! End-to-end runs of the `passfilt` binary
//!
//! These pin the exit codes and stderr messages a caller scripts against.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const INPUT: &str = "password,probability\nlongpassword,0.5\nshort,0.25\ntiny,0.25\n";

fn passfilt(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_passfilt"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run passfilt")
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write file");
    path
}

fn oracle(dir: &TempDir, script: &str) -> PathBuf {
    let path = write(dir, "oracle", script);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("utf8 temp path")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn policy_run_writes_redistributed_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(&dir, "in.csv", INPUT);

    let output = passfilt(&["policy", "-n", "8", "-m", "proportional", arg(&input)]);

    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout, "password,probability\nlongpassword,1\n");
}

#[test]
fn fully_filtered_run_exits_zero_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(&dir, "in.csv", INPUT);

    let output = passfilt(&["policy", "-n", "100", "-m", "uniform", arg(&input)]);

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("filtered out"), "{}", stderr(&output));
}

#[test]
fn unknown_mode_is_reported_before_the_input_is_read() {
    let output = passfilt(&["policy", "-m", "zipf", "/nonexistent/in.csv"]);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Unknown redistribution mode: zipf"), "{}", err);
    assert!(!err.contains("not found"), "{}", err);
}

#[test]
fn missing_oracle_executable_fails_the_launch() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(&dir, "in.csv", INPUT);
    let config = write(
        &dir,
        "run.json",
        r#"{"oracle":{"retry":{"max_attempts":2,"grace_unit_ms":10}}}"#,
    );

    let output = passfilt(&[
        "authority",
        "-a",
        "/nonexistent/oracle",
        "-p",
        "basic8",
        "-m",
        "uniform",
        "--config",
        arg(&config),
        arg(&input),
    ]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Could not launch oracle"), "{}", stderr(&output));
}

#[test]
fn oracle_that_dies_on_every_query_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(&dir, "in.csv", INPUT);
    let exe = oracle(&dir, "#!/bin/sh\nIFS= read -r pw\nexit 1\n");
    let config = write(
        &dir,
        "run.json",
        r#"{"oracle":{"retry":{"max_attempts":3,"grace_unit_ms":10}}}"#,
    );

    let output = passfilt(&[
        "authority",
        "-a",
        arg(&exe),
        "-p",
        "basic8",
        "-m",
        "proportional",
        "--config",
        arg(&config),
        arg(&input),
    ]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("Oracle unavailable"), "{}", stderr(&output));
}

#[test]
fn guess_prints_the_cumulative_curve() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(&dir, "in.csv", INPUT);

    let output = passfilt(&["guess", arg(&input)]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "0\n0.5\n0.75\n1\n");
}

#[test]
fn usage_errors_exit_two() {
    assert_eq!(passfilt(&["policy", "-n", "8"]).status.code(), Some(2));
    assert_eq!(passfilt(&["rank", "in.csv"]).status.code(), Some(2));
}
