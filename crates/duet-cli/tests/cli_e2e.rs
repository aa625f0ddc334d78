//! End-to-end CLI flow against the offline fake provider: run a full
//! experiment, inspect rater and admin views, rate, and export.

use assert_cmd::Command;
use predicates::prelude::*;

fn duet() -> Command {
    Command::cargo_bin("duet").unwrap()
}

#[test]
fn run_view_rate_export_flow() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("duet.db");
    let db = db.to_str().unwrap();

    // Full pipeline offline.
    let out = duet()
        .args([
            "--db",
            db,
            "--provider",
            "fake",
            "run",
            "--prompt",
            "Explain photosynthesis",
        ])
        .assert()
        .success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    let run: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let experiment_id = run["experiment_id"].as_str().unwrap().to_string();
    assert_eq!(run["snapshot"]["status"], "completed");

    // Rater view: prompts and responses, no verdict fields.
    let out = duet()
        .args([
            "--db", db, "--provider", "fake", "view", "--id", &experiment_id, "--role", "rater",
            "--rater", "r1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Explain photosynthesis"))
        .stdout(predicate::str::contains("verdict").not());
    let rater_view: serde_json::Value =
        serde_json::from_str(&String::from_utf8(out.get_output().stdout.clone()).unwrap())
            .unwrap();
    let baseline_response_id = rater_view["arms"][0]["response"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Admin view exposes the judge output.
    duet()
        .args([
            "--db", db, "--provider", "fake", "view", "--id", &experiment_id, "--role", "admin",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("verdict"))
        .stdout(predicate::str::contains("judge_kind"));

    // First rating lands, the duplicate conflicts.
    duet()
        .args([
            "--db",
            db,
            "--provider",
            "fake",
            "rate",
            "--response",
            &baseline_response_id,
            "--rater",
            "r1",
            "--score",
            "4",
        ])
        .assert()
        .success();
    duet()
        .args([
            "--db",
            db,
            "--provider",
            "fake",
            "rate",
            "--response",
            &baseline_response_id,
            "--rater",
            "r1",
            "--score",
            "5",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate rating"));

    // Listing and export both see the experiment.
    duet()
        .args(["--db", db, "--provider", "fake", "list", "--status", "completed"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&experiment_id));

    let export_path = dir.path().join("runs.jsonl");
    duet()
        .args([
            "--db",
            db,
            "--provider",
            "fake",
            "export",
            "--out",
            export_path.to_str().unwrap(),
        ])
        .assert()
        .success();
    let exported = std::fs::read_to_string(&export_path).unwrap();
    assert_eq!(exported.lines().count(), 1);
    let record: serde_json::Value = serde_json::from_str(exported.lines().next().unwrap()).unwrap();
    assert_eq!(record["experiment"]["id"].as_str().unwrap(), experiment_id);
    assert!(record["fingerprint"].as_str().unwrap().len() == 64);
}

#[test]
fn submit_rejects_an_empty_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("duet.db");
    duet()
        .args([
            "--db",
            db.to_str().unwrap(),
            "--provider",
            "fake",
            "submit",
            "--prompt",
            "   ",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation error"));
}
