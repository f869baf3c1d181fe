//! Tests for `picksense match`:
//! - human and JSON output for the two-detector scenarios
//! - sampling rates given as PATH@RATE
//! - error reporting for unreadable or malformed input

use assert_cmd::Command;
use insta::assert_json_snapshot;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct Picks {
    dir: TempDir,
}

impl Picks {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn file(&self, name: &str, content: &str) -> String {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    /// An empty job file, so the user's own configuration never applies.
    fn empty_config(&self) -> PathBuf {
        let path = self.dir.path().join("empty-config.toml");
        fs::write(&path, "").unwrap();
        path
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("picksense").unwrap();
        cmd.env("PICKSENSE_CONFIG", self.empty_config());
        cmd.env_remove("RUST_LOG");
        cmd
    }

    fn scenario_a(&self) -> (String, String) {
        (
            self.file("a.pos", "# x y\n10 10\n50 50\n"),
            self.file("b.pos", "11 11\n90 90\n"),
        )
    }
}

fn parse_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("invalid json")
}

#[test]
fn strict_consensus_human_output() {
    let picks = Picks::new();
    let (a, b) = picks.scenario_a();

    picks
        .cmd()
        .args(["match", "-d", &a, "-d", &b, "--radius", "3", "--threshold", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Consensus (2 detectors, radius 3, 2 votes required):",
        ))
        .stdout(predicate::str::contains("10.5 10.5  votes=2"))
        .stdout(predicate::str::contains("50 50").not())
        .stdout(predicate::str::contains("Agreement: 0.500"));
}

#[test]
fn strict_consensus_json() {
    let picks = Picks::new();
    let (a, b) = picks.scenario_a();

    let output = picks
        .cmd()
        .args([
            "match", "-d", &a, "-d", &b, "--radius", "3", "--threshold", "2", "--json",
            "--image", "mic_001",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_json_snapshot!("scenario_a_strict", json);
}

#[test]
fn relaxed_consensus_json() {
    let picks = Picks::new();
    let (a, b) = picks.scenario_a();

    let output = picks
        .cmd()
        .args([
            "match", "-d", &a, "-d", &b, "--radius", "3", "--threshold", "1", "--json",
            "--image", "mic_001",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_json_snapshot!("scenario_b_relaxed", json);
}

#[test]
fn negative_threshold_means_all_detectors() {
    let picks = Picks::new();
    let (a, b) = picks.scenario_a();

    picks
        .cmd()
        .args(["match", "-d", &a, "-d", &b, "-r", "3", "-t", "-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 votes required"));
}

#[test]
fn sampling_rate_suffix_rescales() {
    let picks = Picks::new();
    let a = picks.file("ref.pos", "100 100\n");
    let b = picks.file("binned.pos", "50 50\n");

    let output = picks
        .cmd()
        .args([
            "match",
            "-d",
            &format!("{a}@1.0"),
            "-d",
            &format!("{b}@2.0"),
            "-r",
            "1",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["detectors"][1]["name"], "binned");
    assert_eq!(json["detectors"][1]["sampling_rate"], 2.0);
    assert_eq!(json["outcome"]["points"][0]["votes"], 2);
    assert_eq!(json["outcome"]["points"][0]["position"]["x"], 100.0);
}

#[test]
fn empty_reference_reports_no_points() {
    let picks = Picks::new();
    let a = picks.file("a.pos", "# nothing picked\n");
    let b = picks.file("b.pos", "1 1\n");

    picks
        .cmd()
        .args(["match", "-d", &a, "-d", &b, "-r", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("  none"))
        .stdout(predicate::str::contains("Agreement: 0.000"));
}

#[test]
fn nothing_picked_has_undefined_agreement() {
    let picks = Picks::new();
    let a = picks.file("a.pos", "");
    let b = picks.file("b.pos", "");

    let output = picks
        .cmd()
        .args(["match", "-d", &a, "-d", &b, "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert!(json["outcome"]["agreement_ratio"].is_null());
}

#[test]
fn missing_file_fails() {
    let picks = Picks::new();
    let missing = picks.dir.path().join("missing.pos");

    picks
        .cmd()
        .args(["match", "-d", &missing.display().to_string()])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Error: failed to read"))
        .stderr(predicate::str::contains("missing.pos"));
}

#[test]
fn malformed_file_reports_line() {
    let picks = Picks::new();
    let bad = picks.file("bad.pos", "1 1\n2\n");

    picks
        .cmd()
        .args(["match", "-d", &bad])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("failed to parse"))
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn invalid_radius_fails_before_matching() {
    let picks = Picks::new();
    let (a, b) = picks.scenario_a();

    picks
        .cmd()
        .args(["match", "-d", &a, "-d", &b, "-r", "0"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains(
            "Error: match radius must be positive and finite (got 0)",
        ));
}

#[test]
fn non_positive_rate_fails() {
    let picks = Picks::new();
    let (a, b) = picks.scenario_a();

    picks
        .cmd()
        .args(["match", "-d", &a, "-d", &format!("{b}@-2")])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("detector 1: sampling rate"));
}

#[test]
fn strict_flag_rejects_large_threshold() {
    let picks = Picks::new();
    let (a, b) = picks.scenario_a();

    picks
        .cmd()
        .args(["match", "-d", &a, "-d", &b, "-t", "3", "--strict"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("vote threshold 3 is outside [0, 2]"));

    picks
        .cmd()
        .args(["match", "-d", &a, "-d", &b, "-t", "3"])
        .assert()
        .success();
}

#[test]
fn config_file_supplies_defaults() {
    let picks = Picks::new();
    let (a, b) = picks.scenario_a();
    let config = picks.file("config.toml", "[matching]\nradius = 3.0\nvote_threshold = 1\n");

    Command::cargo_bin("picksense")
        .unwrap()
        .env("PICKSENSE_CONFIG", &config)
        .args(["match", "-d", &a, "-d", &b])
        .assert()
        .success()
        .stdout(predicate::str::contains("radius 3, 1 votes required"))
        .stdout(predicate::str::contains("90 90  votes=1"));
}

#[test]
fn missing_env_config_is_a_usage_error() {
    let picks = Picks::new();
    let (a, b) = picks.scenario_a();

    Command::cargo_bin("picksense")
        .unwrap()
        .env("PICKSENSE_CONFIG", picks.dir.path().join("no-config.toml"))
        .args(["match", "-d", &a, "-d", &b])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn malformed_env_config_is_a_usage_error() {
    let picks = Picks::new();
    let (a, b) = picks.scenario_a();
    let config = picks.file("config.toml", "[matching\nradius = ");

    Command::cargo_bin("picksense")
        .unwrap()
        .env("PICKSENSE_CONFIG", &config)
        .args(["match", "-d", &a, "-d", &b])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("failed to parse"));
}

#[test]
fn detector_is_required() {
    let picks = Picks::new();
    picks
        .cmd()
        .args(["match"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--detector"));
}
