//! Integration tests for the fantasma binary
//!
//! Every test points the CLI at a settings file inside a temp directory, so
//! profiles and session records never touch the host.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fantasma() -> Command {
    Command::cargo_bin("fantasma").unwrap()
}

/// Settings file whose paths all live under `dir`
fn write_settings(dir: &Path) -> PathBuf {
    let path = dir.join("fantasma.toml");
    let content = format!(
        "[paths]\nruntime_dir = {:?}\nprofiles_dir = {:?}\nstate_file = {:?}\n",
        dir.join("run"),
        dir.join("profiles"),
        dir.join("run/session.json")
    );
    fs::write(&path, content).unwrap();
    path
}

fn fantasma_in(dir: &TempDir) -> Command {
    let mut cmd = fantasma();
    cmd.arg("--no-color")
        .arg("--config")
        .arg(write_settings(dir.path()));
    cmd
}

#[test]
fn test_help_command() {
    fantasma()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Share a network connection"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_version() {
    fantasma()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    fantasma()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config"));
}

#[test]
fn test_status_json_without_session() {
    let dir = TempDir::new().unwrap();
    let output = fantasma_in(&dir).arg("--json").arg("status").output().unwrap();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Platform not supported") {
            eprintln!("Test skipped: {}", stderr);
            return;
        }
        panic!("status failed: {}", stderr);
    }

    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["active"], false);
    assert!(status["config"].is_null());
    assert!(status["platform"].is_object());
}

#[test]
fn test_stop_without_session() {
    let dir = TempDir::new().unwrap();
    let output = fantasma_in(&dir).arg("stop").output().unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("Platform not supported") {
        eprintln!("Test skipped: {}", stderr);
        return;
    }
    assert!(output.status.success(), "stop failed: {}", stderr);
    assert!(String::from_utf8_lossy(&output.stdout).contains("No active sharing session"));
}

#[test]
fn test_start_rejects_short_password() {
    let dir = TempDir::new().unwrap();
    fantasma_in(&dir)
        .args(["start", "-s", "eth0", "-t", "wlan0", "--ssid", "Test", "--password", "short"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be 8-63 characters"));
    assert!(!dir.path().join("run/session.json").exists());
}

#[test]
fn test_start_requires_interfaces() {
    let dir = TempDir::new().unwrap();
    fantasma_in(&dir)
        .args(["start", "-s", "eth0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--target"));
}

#[test]
fn test_start_rejects_bad_channel() {
    let dir = TempDir::new().unwrap();
    fantasma_in(&dir)
        .args(["start", "-s", "eth0", "-t", "wlan0", "--channel", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid channel"));
}

#[test]
fn test_profile_workflow() {
    let dir = TempDir::new().unwrap();

    let output = fantasma_in(&dir)
        .args(["profile", "save", "home", "-s", "eth0", "-t", "wlan0"])
        .args(["--ssid", "Home", "--password", "testpass1", "--channel", "11"])
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("Platform not supported") {
        eprintln!("Test skipped: {}", stderr);
        return;
    }
    assert!(output.status.success(), "profile save failed: {}", stderr);
    assert!(dir.path().join("profiles/home.toml").exists());

    fantasma_in(&dir)
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("home"));

    let output = fantasma_in(&dir)
        .args(["--json", "profile", "show", "home"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let profile: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(profile["name"], "home");
    assert_eq!(profile["config"]["ssid"], "Home");
    assert_eq!(profile["config"]["channel"], 11);
    assert_eq!(profile["config"]["password"], "********");

    fantasma_in(&dir)
        .args(["profile", "delete", "home"])
        .assert()
        .success();
    fantasma_in(&dir)
        .args(["profile", "delete", "home"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_profile_save_rejects_bad_name() {
    let dir = TempDir::new().unwrap();
    fantasma_in(&dir)
        .args(["profile", "save", "../escape", "-s", "eth0", "-t", "usb0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid profile name"));
}

#[test]
fn test_doctor_json_report() {
    let dir = TempDir::new().unwrap();
    let output = fantasma_in(&dir).args(["--json", "doctor"]).output().unwrap();

    // Exit status depends on the host's tools; the report is always printed
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let overall = report["overall_status"].as_str().unwrap();
    assert!(overall == "PASS" || overall == "FAIL");
    assert_eq!(output.status.success(), overall == "PASS");
    assert!(report["dependencies"][0]["name"] == "Privileges");
    assert!(report["platform_info"]["system"].is_string());
}
