//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory.

use std::path::Path;
use std::process::Command;

use serde_json::Value;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_stopsmoke"))
        .env("STOPSMOKE_DATA_DIR", data_dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn parse(stdout: &str) -> Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("not JSON ({e}): {stdout}"))
}

#[test]
fn test_log_then_blocked() {
    let dir = tempfile::tempdir().unwrap();

    let (stdout, stderr, code) = run_cli(dir.path(), &["log"]);
    assert_eq!(code, 0, "first log failed: {stderr}");
    assert_eq!(parse(&stdout)["type"], "Logged");

    let (stdout, stderr, code) = run_cli(dir.path(), &["log"]);
    assert_eq!(code, 2, "second log should be refused");
    assert_eq!(parse(&stdout)["type"], "CooldownActive");
    assert!(stderr.contains("Next cigarette available in:"));

    let (stdout, _, code) = run_cli(dir.path(), &["history"]);
    assert_eq!(code, 0);
    assert_eq!(parse(&stdout).as_array().unwrap().len(), 1);
}

#[test]
fn test_status_counts_today() {
    let dir = tempfile::tempdir().unwrap();
    run_cli(dir.path(), &["log"]);

    let (stdout, stderr, code) = run_cli(dir.path(), &["status"]);
    assert_eq!(code, 0, "status failed: {stderr}");
    let status = parse(&stdout);
    assert_eq!(status["smoked_today"], 1);
    assert_eq!(status["allowed_today"], 20);
    assert_eq!(status["phase"], "cooling");
}

#[test]
fn test_reset_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    run_cli(dir.path(), &["log"]);

    let (_, stderr, code) = run_cli(dir.path(), &["reset"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("--yes"));

    let (_, _, code) = run_cli(dir.path(), &["reset", "--yes"]);
    assert_eq!(code, 0);

    let (stdout, _, _) = run_cli(dir.path(), &["history"]);
    assert!(parse(&stdout).as_array().unwrap().is_empty());

    // The cooldown went with the history.
    let (_, _, code) = run_cli(dir.path(), &["log"]);
    assert_eq!(code, 0);
}

#[test]
fn test_config_rejects_zero_allowance() {
    let dir = tempfile::tempdir().unwrap();

    let (_, stderr, code) = run_cli(dir.path(), &["config", "set", "allowance.daily_allowance_base", "0"]);
    assert_eq!(code, 1, "zero allowance must be rejected");
    assert!(stderr.starts_with("error:"));

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "allowance.daily_allowance_base", "10"]);
    assert_eq!(code, 0);

    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "allowance.daily_allowance_base"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "10");
}

#[test]
fn test_config_get_unknown_key() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["config", "get", "no.such.key"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn test_progress_default_window() {
    let dir = tempfile::tempdir().unwrap();

    let (stdout, stderr, code) = run_cli(dir.path(), &["progress", "--weeks", "4"]);
    assert_eq!(code, 0, "progress failed: {stderr}");
    let snapshot = parse(&stdout);
    assert_eq!(snapshot["total_allowed"], 74);
    assert_eq!(snapshot["total_smoked"], 0);
    assert_eq!(snapshot["over_allowance"], false);

    let (_, _, code) = run_cli(dir.path(), &["progress", "--weeks", "0"]);
    assert_eq!(code, 1);
}

#[test]
fn test_progress_daily_breakdown() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["progress", "--weeks", "1", "--daily"]);
    assert_eq!(code, 0);
    let report = parse(&stdout);
    assert_eq!(report["snapshot"]["total_allowed"], 20);
    assert!(!report["days"].as_array().unwrap().is_empty());
}

#[test]
fn test_oversized_windows_fail_cleanly() {
    let dir = tempfile::tempdir().unwrap();

    let (_, stderr, code) = run_cli(dir.path(), &["progress", "--weeks", "20000000"]);
    assert_eq!(code, 1, "expected a clean error, got: {stderr}");
    assert!(stderr.starts_with("error:"));

    let (_, _, code) = run_cli(dir.path(), &["progress", "--weeks", "4294967295", "--daily"]);
    assert_eq!(code, 1);

    let (stdout, _, code) = run_cli(dir.path(), &["history", "--days", "4294967295"]);
    assert_eq!(code, 0);
    assert!(parse(&stdout).as_array().unwrap().is_empty());
}
