//! Integration tests for the `exhaust` CLI binary.
//!
//! Argument parsing, completions, config resolution and the one-shot
//! unit commands, the latter against wiremock relay modules.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `exhaust` binary with env isolation.
///
/// Clears the `EXHAUST_*` variables the CLI and config layer read and
/// points config directories at a nonexistent path so tests never touch
/// a real configuration.
fn exhaust_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("exhaust");
    cmd.env("HOME", "/tmp/exhaust-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/exhaust-cli-test-nonexistent")
        .env("XDG_DATA_HOME", "/tmp/exhaust-cli-test-nonexistent")
        .env_remove("EXHAUST_CONFIG")
        .env_remove("EXHAUST_OUTPUT")
        .env_remove("EXHAUST_STATE_FILE")
        .env_remove("EXHAUST_TIMEOUT_MS")
        .env_remove("EXHAUST_A_14_HOST")
        .env_remove("EXHAUST_PWR_14_HOST")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

/// Write a config file into `dir` with the given `hosts` entries and a
/// state file next to it.
fn write_config(dir: &Path, hosts: &[(&str, String)]) -> (PathBuf, PathBuf) {
    let state = dir.join("state.json");
    let mut body = format!(
        "timeout_ms = 2000\nrearm_delay_ms = 10\nstate_file = {:?}\n\n[hosts]\n",
        state.display().to_string()
    );
    for (module, host) in hosts {
        body.push_str(&format!("{module} = \"{host}\"\n"));
    }
    let config = dir.join("config.toml");
    std::fs::write(&config, body).unwrap();
    (config, state)
}

fn cmnd_of(req: &Request) -> String {
    req.url
        .query_pairs()
        .find(|(k, _)| k == "cmnd")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// A relay module with every pulse time already at 5.
fn healthy_module(req: &Request) -> ResponseTemplate {
    let body = match cmnd_of(req).as_str() {
        "Status" => json!({ "Status": { "DeviceName": "relay" } }),
        "PulseTime" => json!({ "PulseTime": { "Set": [5, 5, 5, 5, 0, 0, 0, 0] } }),
        other => json!({ "Command": other }),
    };
    ResponseTemplate::new(200).set_body_json(body)
}

async fn module_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cm"))
        .respond_with(healthy_module)
        .mount(&server)
        .await;
    server
}

async fn commands(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(cmnd_of)
        .collect()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = exhaust_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    exhaust_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("exhaust fans")
            .and(predicate::str::contains("run"))
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("configure")),
    );
}

#[test]
fn test_version_flag() {
    exhaust_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("exhaust"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    exhaust_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    exhaust_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = exhaust_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_on_requires_unit_id() {
    exhaust_cmd().arg("on").assert().code(2);
}

#[test]
fn test_invalid_output_format() {
    exhaust_cmd()
        .args(["parse", "A1", "-o", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("xml"));
}

// ── Parse ───────────────────────────────────────────────────────────

#[test]
fn test_parse_json() {
    let output = exhaust_cmd()
        .args(["parse", "a-1", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed = stdout_json(&output);
    assert_eq!(parsed["id"], "A1");
    assert_eq!(parsed["moduleId"], "A_14");
    assert_eq!(parsed["powerModule"], "PWR_14");
    assert_eq!(parsed["powerRelay"], 1);
}

#[test]
fn test_parse_upper_group() {
    let output = exhaust_cmd()
        .args(["parse", "C_7", "-o", "json"])
        .output()
        .unwrap();
    let parsed = stdout_json(&output);
    assert_eq!(parsed["group"], "58");
    assert_eq!(parsed["relay"], 3);
    assert_eq!(parsed["moduleId"], "C_58");
    assert_eq!(parsed["powerModule"], "PWR_58");
    assert_eq!(parsed["powerRelay"], 3);
}

#[test]
fn test_parse_table() {
    exhaust_cmd()
        .args(["parse", "B5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("B_58 relay 1").and(predicate::str::contains("PWR_58 relay 2")));
}

#[test]
fn test_parse_invalid_id() {
    exhaust_cmd()
        .args(["parse", "D9"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("D9"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_flag() {
    exhaust_cmd()
        .args(["config", "path", "--config", "/tmp/somewhere/exhaust.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/somewhere/exhaust.toml"));
}

#[test]
fn test_config_show_merges_env() {
    let dir = TempDir::new().unwrap();
    let (config, _) = write_config(dir.path(), &[("a_14", "10.0.0.11".into())]);

    let output = exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["config", "show", "-o", "json"])
        .env("EXHAUST_PWR_14_HOST", "10.0.0.17")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let shown = stdout_json(&output);
    assert_eq!(shown["hosts"]["a_14"], "10.0.0.11");
    assert_eq!(shown["hosts"]["pwr_14"], "10.0.0.17");
    assert_eq!(shown["timeout_ms"], 2000);
    assert_eq!(shown["port"], 80);
}

#[test]
fn test_config_show_rejects_unknown_module() {
    let dir = TempDir::new().unwrap();
    let (config, _) = write_config(dir.path(), &[("d_14", "10.0.0.99".into())]);

    exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("d_14"));
}

// ── State views ─────────────────────────────────────────────────────

fn seed_state(state: &Path) {
    let doc = json!({
        "version": 1,
        "updatedAt": "2026-01-01T00:00:00Z",
        "states": [{
            "id": "A6",
            "tower": "A",
            "final": 6,
            "group": "58",
            "relay": 2,
            "moduleId": "A_58",
            "expiresAt": "2099-01-01T00:00:00Z",
            "processStatus": "applied",
            "pendingCommand": "on",
            "lastError": null,
            "retryCount": 0,
            "updatedAt": "2026-01-01T00:00:00Z"
        }]
    });
    std::fs::write(state, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
}

#[test]
fn test_process_lists_persisted_states() {
    let dir = TempDir::new().unwrap();
    let (config, state) = write_config(dir.path(), &[]);
    seed_state(&state);

    let output = exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["ps", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let snapshot = stdout_json(&output);
    assert_eq!(snapshot["total"], 1);
    assert_eq!(snapshot["memory"][0]["id"], "A6");
    assert_eq!(snapshot["memory"][0]["processStatus"], "applied");

    exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["process", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::diff("A6\n"));
}

#[test]
fn test_status_single_unit() {
    let dir = TempDir::new().unwrap();
    let (config, state) = write_config(dir.path(), &[]);
    seed_state(&state);

    let output = exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["status", "a6", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let unit = stdout_json(&output);
    assert_eq!(unit["id"], "A6");
    assert_eq!(unit["moduleId"], "A_58");
    assert_eq!(unit["memory"]["pendingCommand"], "on");
    assert!(unit["module"].is_null());
}

#[test]
fn test_status_fleet_table() {
    let dir = TempDir::new().unwrap();
    let (config, state) = write_config(dir.path(), &[]);
    seed_state(&state);

    exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .arg("st")
        .assert()
        .success()
        .stdout(predicate::str::contains("A6").and(predicate::str::contains("No module status")));
}

// ── Unit commands against live modules ──────────────────────────────

#[test]
fn test_on_unconfigured_module() {
    let dir = TempDir::new().unwrap();
    let (config, state) = write_config(dir.path(), &[]);

    exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["on", "A1", "-m", "10"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("A_14"));
    assert!(!state.exists(), "rejected turn-on must not write state");
}

#[test]
fn test_on_invalid_unit() {
    let dir = TempDir::new().unwrap();
    let (config, _) = write_config(dir.path(), &[]);

    exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["on", "A9"])
        .assert()
        .code(2);
}

#[test]
fn test_on_then_off() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (a14, pwr14) = rt.block_on(async { (module_server().await, module_server().await) });

    let dir = TempDir::new().unwrap();
    let (config, state) = write_config(
        dir.path(),
        &[
            ("a_14", a14.address().to_string()),
            ("pwr_14", pwr14.address().to_string()),
        ],
    );

    let output = exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["on", "A2", "--minutes", "15", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let ack = stdout_json(&output);
    assert_eq!(ack["id"], "A2");
    assert_eq!(ack["processStatus"], "applied");
    assert_eq!(ack["autoOffMinutes"], 15);

    let sent = rt.block_on(commands(&a14));
    assert!(sent.contains(&"Power2 On".to_owned()), "{sent:?}");
    // One-shot commands never re-initialize a module.
    assert!(!sent.contains(&"Power1 Off".to_owned()), "{sent:?}");

    let doc: Value = serde_json::from_slice(&std::fs::read(&state).unwrap()).unwrap();
    assert_eq!(doc["states"][0]["id"], "A2");

    let output = exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["off", "A2", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let ack = stdout_json(&output);
    assert_eq!(ack["processStatus"], "applied");
    assert_eq!(ack["powerModule"], "PWR_14");

    let cut = rt.block_on(commands(&pwr14));
    assert!(cut.contains(&"Power1 On".to_owned()), "{cut:?}");

    let doc: Value = serde_json::from_slice(&std::fs::read(&state).unwrap()).unwrap();
    assert_eq!(doc["states"].as_array().map(Vec::len), Some(0));
}

#[test]
fn test_on_device_failure_is_reported() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let a14 = rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cm"))
            .respond_with(|req: &Request| {
                if cmnd_of(req).starts_with("Power") {
                    ResponseTemplate::new(500).set_body_string("relay fault")
                } else {
                    healthy_module(req)
                }
            })
            .mount(&server)
            .await;
        server
    });

    let dir = TempDir::new().unwrap();
    let (config, state) = write_config(dir.path(), &[("a_14", a14.address().to_string())]);

    exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["on", "A3"])
        .assert()
        .code(5)
        .stdout(predicate::str::contains("Failed"));

    // The failed state stays behind for the scheduler to retry.
    let doc: Value = serde_json::from_slice(&std::fs::read(&state).unwrap()).unwrap();
    assert_eq!(doc["states"][0]["processStatus"], "failed");
    assert_eq!(doc["states"][0]["retryCount"], 1);
}

#[test]
fn test_on_off_refused_while_state_file_is_locked() {
    use fs2::FileExt;

    let rt = tokio::runtime::Runtime::new().unwrap();
    let a14 = rt.block_on(module_server());

    let dir = TempDir::new().unwrap();
    let (config, state) = write_config(dir.path(), &[("a_14", a14.address().to_string())]);
    seed_state(&state);
    let before = std::fs::read_to_string(&state).unwrap();

    // Stand in for a running `exhaust run`.
    let lock = std::fs::File::create(dir.path().join("state.json.lock")).unwrap();
    lock.try_lock_exclusive().unwrap();

    for args in [["on", "A1"], ["off", "A6"]] {
        exhaust_cmd()
            .arg("--config")
            .arg(&config)
            .args(args)
            .assert()
            .code(6)
            .stderr(predicate::str::contains("exhaust run"));
    }
    assert!(rt.block_on(commands(&a14)).is_empty());
    assert_eq!(std::fs::read_to_string(&state).unwrap(), before);

    let output = exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["status", "A6", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(stdout_json(&output)["memory"]["pendingCommand"], "on");

    lock.unlock().unwrap();
    exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["on", "A1"])
        .assert()
        .success();
}

#[test]
fn test_configure_passthrough() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let pwr14 = rt.block_on(module_server());

    let dir = TempDir::new().unwrap();
    let (config, _) = write_config(dir.path(), &[("pwr_14", pwr14.address().to_string())]);

    let output = exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["configure", "7", "Backlog%20PulseTime1%205", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(stdout_json(&output)["Command"], "Backlog PulseTime1 5");
}

#[test]
fn test_configure_unknown_module() {
    let dir = TempDir::new().unwrap();
    let (config, _) = write_config(dir.path(), &[]);

    exhaust_cmd()
        .arg("--config")
        .arg(&config)
        .args(["configure", "9", "Status"])
        .assert()
        .code(2);
}
