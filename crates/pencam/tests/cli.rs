use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn write_config(dir: &Path, enclosure_extra: &str) -> PathBuf {
    let settings = dir.join("cam.pfs");
    fs::write(&settings, "Width\t16\nHeight\t12\n").expect("settings");
    let raw = format!(
        r#"{{
            "base_directory": "{base}",
            "farm_name": "farm",
            "enclosures": [{{
                "enclosure_id": 1,
                "pen_id": 9,
                "pen_name": "pen-9",
                "left_camera_details": {{"serial_number": "L-1", "ip_address": "", "settings_file": "{settings}"}}
                {enclosure_extra}
            }}],
            "capture": {{"settle_ms": 0, "pair_window_ms": 50}}
        }}"#,
        base = dir.join("out").display(),
        settings = settings.display(),
    );
    let path = dir.join("config.json");
    fs::write(&path, raw).expect("config");
    path
}

fn full_config(dir: &Path) -> PathBuf {
    let settings = dir.join("cam.pfs");
    let right = format!(
        r#", "right_camera_details": {{"serial_number": "R-1", "ip_address": "", "settings_file": "{}"}}"#,
        settings.display()
    );
    write_config(dir, &right)
}

fn pencam() -> Command {
    Command::cargo_bin("pencam").expect("pencam binary")
}

#[test]
fn check_config_prints_registry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = full_config(dir.path());

    pencam()
        .args(["check-config", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"partner_serial_number\": \"R-1\""))
        .stdout(predicate::str::contains("\"side\": \"right\""));
}

#[test]
fn missing_right_camera_exits_with_config_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path(), "");

    pencam()
        .args(["stereo", "--config"])
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("right_camera_details"));
}

#[test]
fn stereo_run_writes_pairs_and_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = full_config(dir.path());
    let summary = dir.path().join("summary.json");

    pencam()
        .args(["stereo", "--frames", "4", "--config"])
        .arg(&config)
        .arg("--summary")
        .arg(&summary)
        .assert()
        .success();

    let pen_dir = dir.path().join("out/farm/pen-9");
    let names: Vec<String> = fs::read_dir(&pen_dir)
        .expect("pen dir created")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 4);
    assert_eq!(names.iter().filter(|n| n.starts_with("left_farm_9_")).count(), 2);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary).expect("summary")).expect("json");
    assert_eq!(report["frames_retrieved"], 4);
    assert_eq!(report["pairs_opened"], 2);
}

#[test]
fn device_timeout_exits_with_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = full_config(dir.path());

    pencam()
        .args(["stereo", "--stall-after", "1", "--config"])
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no frame arrived"));
}

#[test]
fn unknown_devices_exit_with_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = full_config(dir.path());

    pencam()
        .args(["stereo", "--emulate", "2", "--config"])
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not part of the rig configuration"));
}
