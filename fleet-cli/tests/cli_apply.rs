use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

const SPEC_V1: &str = r#"
namespace: { kind: user, id: 1 }
name: bump-deps
description: Bump all the things
changesets:
  - repository: github.com/acme/a
    spec:
      kind: branch
      base_ref: refs/heads/main
      head_ref: refs/heads/bump-deps
      title: Bump deps
      commits:
        - message: bump
          diff: "@@ -1 +1 @@\n-version = 1\n+version = 2\n"
  - repository: github.com/acme/b
    spec: { kind: tracking, external_id: "42" }
"#;

fn fleet_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("fleet"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "warn");
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is JSON")
}

/// Initialize a home with two public repositories and upload `SPEC_V1`.
/// Returns the spec's rand id.
fn setup(home: &TempDir) -> String {
    fleet_cmd(home.path())
        .args(["init", "--user", "1"])
        .assert()
        .success()
        .stdout(contains("Initialized fleet for user 1"));
    for repo in ["github.com/acme/a", "github.com/acme/b"] {
        fleet_cmd(home.path())
            .args(["repo", "add", repo])
            .assert()
            .success();
    }

    let spec_path = home.path().join("bump.yaml");
    std::fs::write(&spec_path, SPEC_V1).expect("write spec");
    let spec = stdout_json(fleet_cmd(home.path()).args([
        "spec",
        "create",
        spec_path.to_str().expect("utf8 path"),
        "--json",
    ]));
    spec["rand_id"].as_str().expect("rand_id").to_string()
}

#[test]
fn init_is_idempotent() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path()).arg("init").assert().success();
    fleet_cmd(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("Already initialized"));
    assert!(home.path().join(".fleet/config.yaml").exists());
    assert!(home.path().join(".fleet/fleet.db").exists());
}

#[test]
fn dry_run_reports_changes_and_writes_nothing() {
    let home = TempDir::new().unwrap();
    let rand_id = setup(&home);

    fleet_cmd(home.path())
        .args(["apply", &rand_id, "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run] Would apply campaign 'bump-deps'"))
        .stdout(contains("CREATED"))
        .stdout(contains("No changes written"));

    let status = stdout_json(fleet_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status.as_array().map(Vec::len), Some(0));
}

#[test]
fn apply_then_reapply_then_converge() {
    let home = TempDir::new().unwrap();
    let rand_id = setup(&home);

    let outcome = stdout_json(fleet_cmd(home.path()).args(["apply", &rand_id, "--json"]));
    assert_eq!(outcome["unchanged"], Value::Bool(false));
    assert_eq!(outcome["mutations"].as_array().map(Vec::len), Some(2));
    let campaign_id = outcome["campaign"]["id"].as_i64().expect("campaign id");

    fleet_cmd(home.path())
        .args(["apply", &rand_id])
        .assert()
        .success()
        .stdout(contains("already up to date"));

    let status = stdout_json(fleet_cmd(home.path()).args([
        "status",
        "--campaign",
        "bump-deps",
        "--json",
    ]));
    assert_eq!(status[0]["campaign"]["id"].as_i64(), Some(campaign_id));
    assert_eq!(status[0]["convergence"], "pending");
    assert_eq!(status[0]["changesets"].as_array().map(Vec::len), Some(2));

    fleet_cmd(home.path())
        .args(["worker", "claim"])
        .assert()
        .success()
        .stdout(contains("Claimed changeset"))
        .stdout(contains("Released it back to the queue"));
    let status = stdout_json(fleet_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status[0]["convergence"], "pending");

    for _ in 0..2 {
        fleet_cmd(home.path())
            .args(["worker", "complete"])
            .assert()
            .success()
            .stdout(contains("completed"));
    }
    fleet_cmd(home.path())
        .args(["worker", "complete"])
        .assert()
        .success()
        .stdout(contains("Queue is empty"));

    let status = stdout_json(fleet_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status[0]["convergence"], "converged");
}

#[test]
fn other_users_cannot_apply_or_close() {
    let home = TempDir::new().unwrap();
    let rand_id = setup(&home);

    fleet_cmd(home.path())
        .args(["--user", "2", "apply", &rand_id])
        .assert()
        .failure()
        .stderr(contains("forbidden"));

    let outcome = stdout_json(fleet_cmd(home.path()).args(["apply", &rand_id, "--json"]));
    let campaign_id = outcome["campaign"]["id"].to_string();

    fleet_cmd(home.path())
        .args(["--user", "2", "close", &campaign_id])
        .assert()
        .failure()
        .stderr(contains("forbidden"));
    fleet_cmd(home.path())
        .args(["--user", "2", "--site-admin", "close", &campaign_id])
        .assert()
        .success()
        .stdout(contains("Closed campaign 'bump-deps'"));

    fleet_cmd(home.path())
        .args(["apply", &rand_id])
        .assert()
        .failure()
        .stderr(contains("is closed"));
}

#[test]
fn unknown_rand_id_fails() {
    let home = TempDir::new().unwrap();
    fleet_cmd(home.path()).arg("init").assert().success();
    fleet_cmd(home.path())
        .args(["apply", "deadbeef"])
        .assert()
        .failure()
        .stderr(contains("spec not found: deadbeef"));
}

#[test]
fn worker_errors_count_failures_and_retry() {
    let home = TempDir::new().unwrap();
    let rand_id = setup(&home);
    fleet_cmd(home.path()).args(["apply", &rand_id]).assert().success();

    fleet_cmd(home.path())
        .args(["worker", "error", "-m", "rate limited"])
        .assert()
        .success()
        .stdout(contains("is errored after 1 failure(s)"));
    let status = stdout_json(fleet_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status[0]["convergence"], "pending");

    fleet_cmd(home.path())
        .args(["worker", "retry"])
        .assert()
        .success()
        .stdout(contains("Re-queued 1 changeset(s)."));
    fleet_cmd(home.path())
        .args(["worker", "complete", "999"])
        .assert()
        .failure()
        .stderr(contains("failed to claim changeset 999"));
}
