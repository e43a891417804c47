//! CLI command integration tests.
//! Each test uses a temp directory via CAPE_DATA_DIR for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cape_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("cape").unwrap();
    cmd.env("CAPE_DATA_DIR", data_dir.path());
    cmd.env_remove("CAPE_DB");
    cmd.env_remove("CAPE_CONFIG");
    cmd
}

#[test]
fn stats_fresh_db() {
    let dir = TempDir::new().unwrap();
    cape_cmd(&dir)
        .args(["stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tokens:     0"))
        .stdout(predicate::str::contains("groups:     0"))
        .stdout(predicate::str::contains("objects:    0"));
}

#[test]
fn group_add_show_ls_rm() {
    let dir = TempDir::new().unwrap();

    cape_cmd(&dir)
        .args(["group", "add", "eng", "beta", "alpha"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eng: alpha, beta"));

    cape_cmd(&dir)
        .args(["group", "show", "eng"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eng: alpha, beta"));

    cape_cmd(&dir)
        .args(["group", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eng"));

    cape_cmd(&dir)
        .args(["group", "rm", "eng"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted eng"));

    // Removal is idempotent; lookup is not.
    cape_cmd(&dir)
        .args(["group", "rm", "eng"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no such group"));

    cape_cmd(&dir)
        .args(["group", "show", "eng"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn group_add_is_update() {
    let dir = TempDir::new().unwrap();

    cape_cmd(&dir)
        .args(["group", "add", "eng", "a", "b"])
        .assert()
        .success();

    cape_cmd(&dir)
        .args(["group", "add", "eng", "b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eng: b"));

    // Still exactly one group.
    cape_cmd(&dir)
        .args(["stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("groups:     1"));
}

#[test]
fn group_show_json() {
    let dir = TempDir::new().unwrap();

    cape_cmd(&dir)
        .args(["group", "add", "eng", "alpha"])
        .assert()
        .success();

    cape_cmd(&dir)
        .args(["group", "show", "eng", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"eng\""))
        .stdout(predicate::str::contains("\"alpha\""));
}

#[test]
fn object_lifecycle() {
    let dir = TempDir::new().unwrap();

    cape_cmd(&dir)
        .args(["group", "add", "eng", "g1", "g2"])
        .assert()
        .success();

    let output = cape_cmd(&dir)
        .args(["object", "add", "--token", "own", "--group", "eng"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let uuid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    assert!(!uuid.is_empty(), "object add should print the uuid");

    // Show reports the effective label: own token plus group tokens.
    cape_cmd(&dir)
        .args(["object", "show", &uuid])
        .assert()
        .success()
        .stdout(predicate::str::contains("tokens: g1, g2, own"))
        .stdout(predicate::str::contains("groups: eng"));

    cape_cmd(&dir)
        .args(["object", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&uuid));

    cape_cmd(&dir)
        .args(["object", "rm", &uuid])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted"));

    cape_cmd(&dir)
        .args(["object", "show", &uuid])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    // The group survives the object delete.
    cape_cmd(&dir)
        .args(["group", "show", "eng"])
        .assert()
        .success();
}

#[test]
fn object_supplied_uuid_conflict() {
    let dir = TempDir::new().unwrap();

    cape_cmd(&dir)
        .args(["object", "add", "--uuid", "fixed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fixed"));

    cape_cmd(&dir)
        .args(["object", "add", "--uuid", "fixed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already in use"));
}

#[test]
fn object_unknown_group_fails() {
    let dir = TempDir::new().unwrap();

    cape_cmd(&dir)
        .args(["object", "add", "--group", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn group_update_propagates_to_objects() {
    let dir = TempDir::new().unwrap();

    cape_cmd(&dir)
        .args(["group", "add", "eng", "t1", "t2"])
        .assert()
        .success();

    let output = cape_cmd(&dir)
        .args(["object", "add", "--group", "eng"])
        .output()
        .unwrap();
    let uuid = String::from_utf8_lossy(&output.stdout).trim().to_string();

    cape_cmd(&dir)
        .args(["group", "add", "eng", "t2"])
        .assert()
        .success();

    cape_cmd(&dir)
        .args(["object", "show", &uuid])
        .assert()
        .success()
        .stdout(predicate::str::contains("tokens: t2"));
}

#[test]
fn ls_pagination() {
    let dir = TempDir::new().unwrap();

    for name in ["g1", "g2", "g3"] {
        cape_cmd(&dir)
            .args(["group", "add", name])
            .assert()
            .success();
    }

    let output = cape_cmd(&dir)
        .args(["group", "ls", "--limit", "2", "--offset", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let names: Vec<&str> = std::str::from_utf8(&output.stdout)
        .unwrap()
        .lines()
        .collect();
    assert_eq!(names, vec!["g2", "g3"]);
}

#[test]
fn missing_required_args() {
    let dir = TempDir::new().unwrap();

    cape_cmd(&dir)
        .args(["group", "add"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));

    cape_cmd(&dir)
        .args(["group", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));

    cape_cmd(&dir)
        .args(["object", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn db_flag_overrides_data_dir() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("elsewhere.db");

    cape_cmd(&dir)
        .args(["group", "add", "eng", "a"])
        .arg("--db")
        .arg(&db)
        .assert()
        .success();

    assert!(db.exists(), "database should be created at the --db path");

    // The default-path database never saw the group.
    cape_cmd(&dir)
        .args(["group", "show", "eng"])
        .assert()
        .failure();
}
