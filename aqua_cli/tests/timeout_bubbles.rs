use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn config(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let toml = r#"
[fetch]
timeout_ms = 100
poll_interval_ms = 2
"#;
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, toml).unwrap();
    cfg
}

#[rstest]
fn silent_device_timeout_bubbles_to_cli() {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);

    let mut cmd = Command::cargo_bin("aqua").unwrap();
    cmd.env("AQUA_TEST_SIM_SILENT", "1");
    cmd.arg("--config").arg(&cfg).arg("fetch-config");
    cmd.assert().code(3).stderr(predicate::str::contains(
        "What happened: The doser did not answer in time",
    ));
}

#[rstest]
fn timeout_is_structured_in_json_mode() {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);

    let mut cmd = Command::cargo_bin("aqua").unwrap();
    cmd.env("AQUA_TEST_SIM_SILENT", "1");
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("self-check");

    let out = cmd.assert().code(3).get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"reason\""))
        .unwrap_or_else(|| panic!("no error JSON; stdout was: {stdout}"));
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(v["reason"], "RequestTimeout");
    assert_eq!(v["exit_code"], 3);
}

#[rstest]
#[case("0")]
#[case("2")]
fn link_loss_mid_transfer_is_link_unavailable(#[case] after: &str) {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);

    let mut cmd = Command::cargo_bin("aqua").unwrap();
    cmd.env("AQUA_TEST_SIM_DROP_AFTER", after);
    cmd.arg("--config").arg(&cfg).arg("fetch-config");
    cmd.assert().code(2).stderr(predicate::str::contains(
        "What happened: The link to the doser is not available",
    ));
}
