use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::tempdir;

fn write_file(path: &Path, contents: &str) {
    fs::write(path, contents).expect("file should write");
}

fn run_lithos(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_lithos"))
        .current_dir(cwd)
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("lithos command should run")
}

fn error_envelope(output: &std::process::Output) -> Value {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with('{'))
        .expect("stderr should carry a json envelope");
    serde_json::from_str(line).expect("envelope should parse")
}

#[test]
fn check_accepts_the_built_in_scene() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_lithos(dir.path(), &["check"]);
    assert!(output.status.success(), "check should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("OK: <default scene>"));
    assert!(stdout.contains("ceiling"));
}

#[test]
fn invalid_scene_reports_config_error_envelope() {
    let dir = tempdir().expect("tempdir should create");
    write_file(
        &dir.path().join("scene.yaml"),
        "version: 1\nroom:\n  width: -4\n",
    );

    let output = run_lithos(dir.path(), &["check", "scene.yaml", "--json"]);
    assert_eq!(output.status.code(), Some(3));
    let envelope = error_envelope(&output);
    assert_eq!(envelope["ok"], Value::Bool(false));
    assert_eq!(envelope["error"]["code"], "LITHOS_CONFIG_INVALID");
    assert_eq!(envelope["error"]["details"]["path"], "scene.yaml");
}

#[test]
fn unknown_scene_key_is_rejected() {
    let dir = tempdir().expect("tempdir should create");
    write_file(&dir.path().join("scene.yaml"), "version: 1\nroof: {}\n");

    let output = run_lithos(dir.path(), &["check", "scene.yaml", "--json"]);
    assert_eq!(output.status.code(), Some(3));
    let envelope = error_envelope(&output);
    let message = envelope["error"]["message"].as_str().expect("message");
    assert!(message.contains("roof"), "message should name the key: {message}");
}

#[test]
fn capacity_json_covers_the_alphabet() {
    let dir = tempdir().expect("tempdir should create");
    let first = run_lithos(dir.path(), &["capacity", "--json"]);
    assert!(first.status.success());
    let second = run_lithos(dir.path(), &["capacity", "--json"]);
    assert_eq!(first.stdout, second.stdout, "capacity output should be stable");

    let parsed: Value = serde_json::from_slice(&first.stdout).expect("json should parse");
    let counts = parsed.as_object().expect("counts object");
    assert_eq!(counts.len(), 26);
    assert!(counts.values().all(|count| count.as_u64().unwrap_or(0) > 0));
}

#[test]
fn simulate_writes_a_report() {
    let dir = tempdir().expect("tempdir should create");
    write_file(
        &dir.path().join("script.yaml"),
        "fps: 10\nduration: 5\nevents:\n  - { at: 0, action: command, text: lithos }\n",
    );

    let output = run_lithos(
        dir.path(),
        &["simulate", "--script", "script.yaml", "-o", "report.json"],
    );
    assert!(output.status.success(), "simulate should succeed");
    let report: Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("report.json")).expect("report should exist"),
    )
    .expect("report should parse");
    assert_eq!(report["frames"], 51);
    assert_eq!(report["letters"].as_array().map(Vec::len), Some(6));
    assert_eq!(report["command_log"][0], "LITHOS");
}

#[test]
fn bad_script_reports_script_error_envelope() {
    let dir = tempdir().expect("tempdir should create");
    write_file(
        &dir.path().join("script.yaml"),
        "events:\n  - { at: 1, action: teleport }\n",
    );

    let output = run_lithos(dir.path(), &["simulate", "--script", "script.yaml", "--json"]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(error_envelope(&output)["error"]["code"], "LITHOS_SCRIPT_INVALID");
}

#[test]
fn pose_reports_letters_in_flight() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_lithos(dir.path(), &["pose", "--command", "ab", "--at", "2", "--json"]);
    assert!(output.status.success());
    let letters: Value = serde_json::from_slice(&output.stdout).expect("json should parse");
    let letters = letters.as_array().expect("letters array");
    assert_eq!(letters.len(), 2);
    assert!(letters.iter().all(|letter| letter["phase"] == "flying"));
    assert!(letters.iter().all(|letter| letter["visible"] == true));
}

#[test]
fn negative_pose_time_is_a_usage_error() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_lithos(
        dir.path(),
        &["pose", "--command", "ab", "--at=-1", "--json"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(error_envelope(&output)["error"]["code"], "LITHOS_USAGE");
}

#[test]
fn fracture_renders_a_png() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_lithos(
        dir.path(),
        &[
            "fracture", "--width", "320", "--height", "240", "--click", "160,60", "--frames",
            "10", "-o", "ceiling.png",
        ],
    );
    assert!(output.status.success(), "fracture should succeed");
    assert!(dir.path().join("ceiling.png").exists());
    assert!(String::from_utf8_lossy(&output.stdout).contains("cells broken"));
}

#[test]
fn malformed_click_is_a_usage_error() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_lithos(
        dir.path(),
        &["fracture", "--click", "middle", "-o", "ceiling.png", "--json"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(error_envelope(&output)["error"]["code"], "LITHOS_USAGE");
    assert!(!dir.path().join("ceiling.png").exists());
}

#[test]
fn event_past_script_duration_is_rejected() {
    let dir = tempdir().expect("tempdir should create");
    write_file(
        &dir.path().join("script.yaml"),
        "duration: 1\nevents:\n  - { at: 3, action: command, text: late }\n",
    );

    let output = run_lithos(dir.path(), &["simulate", "--script", "script.yaml", "--json"]);
    assert_eq!(output.status.code(), Some(3));
    let envelope = error_envelope(&output);
    assert_eq!(envelope["error"]["code"], "LITHOS_SCRIPT_INVALID");
    let message = envelope["error"]["message"].as_str().expect("message");
    assert!(message.contains("duration"), "message should explain: {message}");
}
