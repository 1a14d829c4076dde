//! Basic CLI E2E tests.
//!
//! Tests run the built binary against a throwaway home directory and verify
//! JSON outputs.

use std::io::Write;
use std::process::{Command, Stdio};

use tempfile::TempDir;

/// Run a CLI command with `stdin` and return (stdout, stderr, exit code).
fn run_cli_with_input(home: &TempDir, args: &[&str], stdin: &str) -> (String, String, i32) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_habitroom-cli"))
        .args(args)
        .env("HOME", home.path())
        .env("HABITROOM_ENV", "production")
        .env("HABITROOM_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(stdin.as_bytes())
        .expect("Failed to write stdin");
    let output = child.wait_with_output().expect("Failed to wait for CLI");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);
    (stdout, stderr, code)
}

fn run_cli(home: &TempDir, args: &[&str]) -> (String, String, i32) {
    run_cli_with_input(home, args, "")
}

fn run_json(home: &TempDir, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_week_previous_rolls_over_year() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(&home, &["week", "previous", "2021-W01"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "2020-W53");
}

#[test]
fn test_week_previous_rejects_bad_key() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(&home, &["week", "previous", "2021-53"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error"));
}

#[test]
fn test_config_defaults() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(&home, &["config", "get", "check.start.weekday"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "saturday");
}

#[test]
fn test_config_set_rejects_invalid_schedule() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(&home, &["config", "set", "check.end.hour", "25"]);
    assert_eq!(code, 1);
    let (stdout, _, _) = run_cli(&home, &["config", "get", "check.end.hour"]);
    assert_eq!(stdout.trim(), "23");
}

#[test]
fn test_declare_record_list() {
    let home = TempDir::new().unwrap();
    let habit = run_json(
        &home,
        &["habit", "declare", "--user", "11", "--name", "ana", "Read"],
    );
    let id = habit["id"].as_i64().unwrap().to_string();

    for week in ["2024-W40", "2024-W41"] {
        run_json(&home, &["record", &id, "--week", week]);
    }
    let list = run_json(&home, &["habit", "list", "--user", "11"]);
    assert_eq!(list[0]["streak"], 2);

    let groups = run_json(&home, &["group", "list"]);
    assert_eq!(groups[0]["name"], "habit-tracking-1");
    assert_eq!(groups[0]["members"][0], 11);
}

#[test]
fn test_round_with_console_answers() {
    let home = TempDir::new().unwrap();
    run_json(&home, &["habit", "declare", "--user", "1", "--name", "ana", "Run"]);
    run_json(&home, &["habit", "declare", "--user", "2", "--name", "bo", "Swim"]);

    let (stdout, stderr, code) =
        run_cli_with_input(&home, &["round", "--week", "2024-W41"], "y\n\n");
    assert_eq!(code, 0, "round failed: {stderr}");
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["dispatch"]["dispatched"], 2);
    assert_eq!(report["answers"].as_array().unwrap().len(), 1);
    assert_eq!(report["resolution"]["forced"].as_array().unwrap().len(), 1);
}

#[test]
fn test_unknown_command_fails() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(&home, &["timer", "start"]);
    assert_ne!(code, 0);
}
