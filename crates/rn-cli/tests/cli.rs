//! CLI command integration tests.
//! Each test uses a temp directory via RN_DATA_DIR for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn rn_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("rn").unwrap();
    cmd.env("RN_DATA_DIR", data_dir.path());
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn add_user(dir: &TempDir, id: &str) {
    rn_cmd(dir)
        .args(["user", "add", "--id", id, "--username", id])
        .args(["--referral-code", &id.to_uppercase()])
        .assert()
        .success();
}

/// `boss` is a commercial heading a fresh network; returns its id.
fn seed(dir: &TempDir) -> String {
    add_user(dir, "boss");
    rn_cmd(dir)
        .args(["commercial", "add", "--id", "c1", "--user", "boss"])
        .args(["--reference", "REF-1"])
        .assert()
        .success();
    let output = rn_cmd(dir)
        .args(["network", "create", "c1"])
        .output()
        .unwrap();
    stdout_json(&output)["id"].as_str().unwrap().to_string()
}

#[test]
fn user_add_prints_json() {
    let dir = TempDir::new().unwrap();
    let output = rn_cmd(&dir)
        .args(["user", "add", "--username", "alice", "--name", "Alice"])
        .output()
        .unwrap();
    let user = stdout_json(&output);
    assert_eq!(user["username"], "alice");
    assert_eq!(user["name"], "Alice");
    assert!(!user["id"].as_str().unwrap().is_empty());
    assert!(dir.path().join("network.db").exists());
}

#[test]
fn network_create_seats_root() {
    let dir = TempDir::new().unwrap();
    let network_id = seed(&dir);

    let output = rn_cmd(&dir)
        .args(["network", "show", &network_id])
        .output()
        .unwrap();
    let network = stdout_json(&output);
    assert_eq!(network["total_members"], 1);
    assert_eq!(network["plan_type"], "5:4");
    assert_eq!(network["commercial_id"], "c1");
}

#[test]
fn assign_and_tree() {
    let dir = TempDir::new().unwrap();
    let network_id = seed(&dir);
    add_user(&dir, "alice");
    add_user(&dir, "bob");

    let output = rn_cmd(&dir).args(["assign", "alice", "BOSS"]).output().unwrap();
    let placement = stdout_json(&output);
    assert_eq!(placement["network_id"], network_id.as_str());
    assert_eq!(placement["generation"], 2);
    assert_eq!(placement["position_in_generation"], 1);

    rn_cmd(&dir).args(["assign", "bob", "ALICE"]).assert().success();

    let output = rn_cmd(&dir).args(["tree", "boss"]).output().unwrap();
    let tree = stdout_json(&output);
    assert_eq!(tree["user_id"], "boss");
    assert_eq!(tree["children"][0]["user_id"], "alice");
    assert_eq!(tree["children"][0]["children"][0]["user_id"], "bob");
    assert_eq!(tree["children"][0]["children"][0]["generation"], 3);
}

#[test]
fn tree_for_non_member_is_empty_object() {
    let dir = TempDir::new().unwrap();
    add_user(&dir, "alice");
    rn_cmd(&dir)
        .args(["tree", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::diff("{}\n"));
}

#[test]
fn assign_twice_fails() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    add_user(&dir, "alice");
    rn_cmd(&dir).args(["assign", "alice", "BOSS"]).assert().success();
    rn_cmd(&dir)
        .args(["assign", "alice", "BOSS"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already a member"));
}

#[test]
fn unknown_referral_code_fails() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    add_user(&dir, "alice");
    rn_cmd(&dir)
        .args(["assign", "alice", "NOBODY"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NOBODY"));
}

#[test]
fn position_reports_next_slot() {
    let dir = TempDir::new().unwrap();
    let network_id = seed(&dir);
    let output = rn_cmd(&dir)
        .args(["position", &network_id, "5:4"])
        .output()
        .unwrap();
    let slot = stdout_json(&output);
    assert_eq!(slot["generation"], 1);
    assert_eq!(slot["position_in_generation"], 2);

    rn_cmd(&dir)
        .args(["position", &network_id, "invalid_plan_format"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid network plan"));
}

#[test]
fn network_list_shows_members() {
    let dir = TempDir::new().unwrap();
    let network_id = seed(&dir);
    rn_cmd(&dir)
        .args(["network", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(network_id))
        .stdout(predicate::str::contains("members=1/780"));
}

#[test]
fn config_file_sets_capacity() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[network]\nmax_members = 2\ndefault_plan = \"3:2\"\n",
    )
    .unwrap();
    let first = seed(&dir);
    add_user(&dir, "alice");
    add_user(&dir, "bob");

    rn_cmd(&dir).args(["assign", "alice", "BOSS"]).assert().success();
    let output = rn_cmd(&dir).args(["assign", "bob", "BOSS"]).output().unwrap();
    let placement = stdout_json(&output);
    assert_eq!(placement["overflowed"], true);
    assert_ne!(placement["network_id"], first.as_str());

    let output = rn_cmd(&dir).args(["network", "show", &first]).output().unwrap();
    assert_eq!(stdout_json(&output)["plan_type"], "3:2");
}

#[test]
fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "[network]\nmax_members = 0\n").unwrap();
    rn_cmd(&dir)
        .args(["network", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_members"));
}

#[test]
fn delete_commercial_user_removes_network() {
    let dir = TempDir::new().unwrap();
    let network_id = seed(&dir);
    add_user(&dir, "alice");
    rn_cmd(&dir).args(["assign", "alice", "BOSS"]).assert().success();

    let output = rn_cmd(&dir).args(["user", "delete", "boss"]).output().unwrap();
    let deleted = stdout_json(&output);
    assert_eq!(deleted["networks_removed"], 1);
    assert_eq!(deleted["memberships_removed"], 2);

    rn_cmd(&dir)
        .args(["network", "show", &network_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    rn_cmd(&dir)
        .args(["tree", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::diff("{}\n"));
}

#[test]
fn assign_after_delete_fills_freed_seat() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    for id in ["alice", "bob", "carol"] {
        add_user(&dir, id);
    }
    rn_cmd(&dir).args(["assign", "alice", "BOSS"]).assert().success();
    rn_cmd(&dir).args(["assign", "bob", "BOSS"]).assert().success();
    rn_cmd(&dir).args(["user", "delete", "alice"]).assert().success();

    let output = rn_cmd(&dir).args(["assign", "carol", "BOSS"]).output().unwrap();
    let placement = stdout_json(&output);
    assert_eq!(placement["generation"], 2);
    assert_eq!(placement["position_in_generation"], 2);
    assert_eq!(placement["overflowed"], false);
}

#[test]
fn delete_sponsor_is_refused() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    add_user(&dir, "alice");
    add_user(&dir, "bob");
    rn_cmd(&dir).args(["assign", "alice", "BOSS"]).assert().success();
    rn_cmd(&dir).args(["assign", "bob", "ALICE"]).assert().success();

    rn_cmd(&dir)
        .args(["user", "delete", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("still sponsors"));
}

#[test]
fn data_dir_flag_overrides_env() {
    let env_dir = TempDir::new().unwrap();
    let flag_dir = TempDir::new().unwrap();
    rn_cmd(&env_dir)
        .arg("--data-dir")
        .arg(flag_dir.path())
        .args(["user", "add", "--username", "alice"])
        .assert()
        .success();
    assert!(flag_dir.path().join("network.db").exists());
    assert!(!env_dir.path().join("network.db").exists());
}
