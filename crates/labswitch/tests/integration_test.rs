use std::process::{Command, Output};
use std::time::{Duration, Instant};

fn labswitch(args: &[&str]) -> Output {
    let bin = env!("CARGO_BIN_EXE_labswitch");
    Command::new(bin)
        .args(args)
        .env("RUST_LOG", "info")
        .output()
        .expect("Failed to run labswitch")
}

#[test]
fn help_lists_options() {
    let out = labswitch(&["--help"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("--notifier"));
    assert!(stdout.contains("--simulate"));
}

#[test]
fn unknown_flag_exits_with_error() {
    let out = labswitch(&["--definitely-not-a-flag"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("--definitely-not-a-flag"));
}

#[test]
fn simulated_run_logs_and_journals_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("labswitch.log");
    let journal_path = dir.path().join("events.jsonl");

    let started = Instant::now();
    let out = labswitch(&[
        "--simulate",
        "--simulate-toggle-secs",
        "1",
        "--notifier",
        "none",
        "--run-seconds",
        "3",
        "--log-file",
        log_path.to_str().unwrap(),
        "--journal",
        journal_path.to_str().unwrap(),
    ]);
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(started.elapsed() >= Duration::from_secs(3));

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("daemon started"));
    assert!(log.contains("daemon stopped"));

    let journal = std::fs::read_to_string(&journal_path).unwrap();
    let events: Vec<serde_json::Value> = journal
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["event"], "daemon_started");
    assert_eq!(events.last().unwrap()["event"], "daemon_stopped");
    assert!(events.iter().any(|e| e["event"] == "switch_changed"));
}

#[test]
fn unreachable_broker_is_a_startup_failure() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("labswitch.log");

    let out = labswitch(&[
        "--simulate",
        "--mqtt-host",
        "127.0.0.1",
        "--mqtt-port",
        "1",
        "--mqtt-connect-timeout",
        "1",
        "--log-file",
        log_path.to_str().unwrap(),
    ]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("MQTT startup failed"));
}
