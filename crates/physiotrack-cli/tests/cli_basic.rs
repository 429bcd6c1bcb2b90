//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary home so the
//! config file and database never leak between tests.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(home: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_physiotrack-cli"))
        .args(args)
        .env("HOME", home)
        .env("PHYSIOTRACK_ENV", "dev")
        .env("PHYSIOTRACK_LOG", "error")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

#[test]
fn test_help() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("session"));
    assert!(stdout.contains("device"));
}

#[test]
fn test_config_defaults() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["config", "get", "broker.host"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "broker.emqx.io");

    let (code, stdout, _) = run_cli(home.path(), &["config", "get", "session.gating"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "therapist");
}

#[test]
fn test_config_set_persists() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(home.path(), &["config", "set", "session.gating", "client"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "session.gating"]);
    assert_eq!(stdout.trim(), "client");
}

#[test]
fn test_config_rejects_bad_values() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(home.path(), &["config", "set", "session.gating", "nobody"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));

    let (code, _, _) = run_cli(home.path(), &["config", "get", "broker.nope"]);
    assert_eq!(code, 1);
}

#[test]
fn test_config_rest_cue_limited_to_rest_sounds() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(home.path(), &["config", "set", "audio.rest_cue", "cat"]);
    assert_eq!(code, 0);
    let (code, _, _) = run_cli(home.path(), &["config", "set", "audio.rest_cue", "warning"]);
    assert_eq!(code, 1);
    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "audio.rest_cue"]);
    assert_eq!(stdout.trim(), "cat");
}

#[test]
fn test_config_list_and_reset_section() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(home.path(), &["config", "set", "broker.port", "8883"]);
    assert_eq!(code, 0);
    let (code, _, _) = run_cli(home.path(), &["config", "set", "timer.repetitions", "5"]);
    assert_eq!(code, 0);

    let (code, stdout, _) = run_cli(home.path(), &["config", "list", "broker"]);
    assert_eq!(code, 0);
    let broker: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(broker["port"], 8883);

    let (code, _, _) = run_cli(home.path(), &["config", "reset", "--section", "broker"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "broker.port"]);
    assert_eq!(stdout.trim(), "1883");
    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "timer.repetitions"]);
    assert_eq!(stdout.trim(), "5");

    let (code, _, _) = run_cli(home.path(), &["config", "list", "nope"]);
    assert_eq!(code, 1);
}

#[test]
fn test_timer_show_default() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["timer", "show"]);
    assert_eq!(code, 0);
    let preset: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(preset["work_secs"], 20.0);
    assert_eq!(preset["rest_secs"], 10.0);
    assert_eq!(preset["repetitions"], 3);
}

#[test]
fn test_timer_set_and_show() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(
        home.path(),
        &[
            "timer", "set", "--work", "30", "--rest", "5", "--reps", "4",
        ],
    );
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["timer", "show"]);
    let preset: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(preset["work_secs"], 30.0);
    assert_eq!(preset["repetitions"], 4);
}

#[test]
fn test_timer_set_rejects_missing_and_zero() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(
        home.path(),
        &["timer", "set", "--work", "30", "--rest", "5"],
    );
    assert_eq!(code, 1);
    let (code, _, _) = run_cli(
        home.path(),
        &[
            "timer", "set", "--work", "0", "--rest", "5", "--reps", "2",
        ],
    );
    assert_eq!(code, 1);
}

#[test]
fn test_mode_list_order() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["mode", "list"]);
    assert_eq!(code, 0);
    let rows: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let labels: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["label"].as_str().unwrap())
        .collect();
    assert_eq!(
        labels,
        ["cervical", "thoracic", "lumbar extension", "lumbar", "custom"]
    );
}

#[test]
fn test_mode_custom() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(
        home.path(),
        &["mode", "custom", "--min", "30", "--max", "45"],
    );
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "modes.custom_max"]);
    assert_eq!(stdout.trim().parse::<f64>().unwrap(), 45.0);

    let (code, _, _) = run_cli(
        home.path(),
        &["mode", "custom", "--min", "50", "--max", "40"],
    );
    assert_eq!(code, 1);
}

#[test]
fn test_patient_add_and_list() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["patient", "add", "P-01", "--name", "Ana"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("p-01"));

    let (_, stdout, _) = run_cli(home.path(), &["patient", "add", "p-01"]);
    assert!(stdout.contains("already exists"));

    let (_, stdout, _) = run_cli(home.path(), &["patient", "list"]);
    let patients: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(patients.as_array().unwrap().len(), 1);
    assert_eq!(patients[0]["id"], "p-01");
}

#[test]
fn test_device_set_and_show() {
    let home = tempfile::tempdir().unwrap();
    let (_, stdout, _) = run_cli(home.path(), &["device", "show"]);
    let shown: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(shown["device"].is_null());

    let (code, _, _) = run_cli(home.path(), &["device", "set", "esp32-a1"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["device", "show"]);
    let shown: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(shown["device"], "esp32-a1");
}

#[test]
fn test_session_history_empty() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["session", "history", "--patient", "p-01"]);
    assert_eq!(code, 0);
    let sessions: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(sessions.as_array().unwrap().is_empty());

    let (code, _, _) = run_cli(home.path(), &["session", "show", "p-01/lumbar_0"]);
    assert_eq!(code, 1);
}

#[test]
fn test_session_run_requires_known_patient() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(
        home.path(),
        &["session", "run", "--patient", "zz", "--mode", "lumbar"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}
