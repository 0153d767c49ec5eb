//! End-to-end CLI tests for the dashcam-downloader binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

fn binary() -> Command {
    Command::cargo_bin("dashcam-downloader").unwrap()
}

/// Without a subcommand the binary prints a hint and exits with code 0.
#[test]
fn test_binary_invocation_returns_zero() {
    binary().assert().success();
}

#[test]
fn test_binary_help_displays_usage() {
    binary()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("WiFi dashcam"))
        .stdout(predicate::str::contains("fetch"));
}

#[test]
fn test_binary_version_displays_version() {
    binary()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dashcam-downloader"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    binary()
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_verbose_flag_accepted() {
    binary().arg("-v").assert().success();
}

#[test]
fn test_binary_quiet_flag_accepted() {
    binary().arg("-q").assert().success();
}

/// `fetch` needs at least one collection name.
#[test]
fn test_fetch_without_collection_fails() {
    binary()
        .arg("fetch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<COLLECTIONS>"));
}

#[test]
fn test_concurrency_out_of_range_is_rejected() {
    binary()
        .args(["--concurrency", "17", "collections"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("17"));
}

/// An unreachable device fails the run with a non-zero exit code.
#[test]
fn test_unreachable_device_fails() {
    binary()
        .args([
            "-q",
            "--device-url",
            "http://127.0.0.1:9",
            "collections",
        ])
        .env("XDG_CONFIG_HOME", std::env::temp_dir().join("dashcam-e2e-no-config"))
        .assert()
        .failure();
}

/// Serves a `norm` collection with one good and one missing recording.
async fn mount_norm_collection(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/cgi-bin/hisnet/getdirfilecount.cgi"))
        .and(query_param("-dir", "norm"))
        .respond_with(ResponseTemplate::new(200).set_body_string("var count=\"2\";"))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/hisnet/getdirfilelist.cgi"))
        .and(query_param("-dir", "norm"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "sd/norm/2025_10_12_220337_00.TS;sd/norm/2025_10_12_220437_00.TS;",
        ))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sd/norm/2025_10_12_220337_00.TS"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video".to_vec()))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sd/norm/2025_10_12_220437_00.TS"))
        .respond_with(ResponseTemplate::new(404))
        .mount(mock_server)
        .await;
}

fn fetch_command(mock_server: &MockServer, home: &TempDir, output: &TempDir) -> Command {
    let mut cmd = binary();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env_remove("RUST_LOG")
        .args(["-q", "--device-url", &mock_server.uri(), "-o"])
        .arg(output.path())
        .args(["-r", "1", "--retry-delay-ms", "0", "fetch", "norm", "--json"]);
    cmd
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_with_failed_transfer_exits_one_and_reports_json() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_norm_collection(&mock_server).await;
    let home = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    let assert = fetch_command(&mock_server, &home, &output)
        .assert()
        .failure()
        .code(1);

    let summary: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["downloaded"], 1);
    assert_eq!(summary["failed"], 1);
    assert_eq!(summary["interrupted"], false);
    assert_eq!(
        summary["failures"][0]["locator"],
        "sd/norm/2025_10_12_220437_00.TS"
    );

    let saved = output.path().join("2025-10-12").join("2025_10_12_220337_00.TS");
    assert_eq!(std::fs::read(saved).unwrap(), b"video");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_counts_files_already_on_disk() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_norm_collection(&mock_server).await;
    let home = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let day = output.path().join("2025-10-12");
    std::fs::create_dir_all(&day).unwrap();
    std::fs::write(day.join("2025_10_12_220437_00.TS"), b"kept").unwrap();

    let assert = fetch_command(&mock_server, &home, &output)
        .assert()
        .success();

    let summary: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(summary["downloaded"], 1);
    assert_eq!(summary["already_present"], 1);
    assert_eq!(summary["failed"], 0);
    assert_eq!(std::fs::read(day.join("2025_10_12_220437_00.TS")).unwrap(), b"kept");
}
