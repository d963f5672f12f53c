mod common;

use predicates::prelude::*;

use common::TestEnv;

#[test]
fn add_and_list_users() {
    let env = TestEnv::new();

    env.cmd()
        .args(["users", "add", "Aziz", "--group", "sales"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added user 1 (Aziz)."));
    env.cmd()
        .args(["users", "add", "Portal Bot", "--external", "--company", "2"])
        .assert()
        .success();

    env.cmd()
        .args(["users", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Aziz"))
        .stdout(predicate::str::contains("sales"))
        .stdout(predicate::str::contains("external"));

    let output = env.cmd_json().args(["users", "list"]).output().unwrap();
    let users: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(users.as_array().unwrap().len(), 2);
    assert_eq!(users[0]["company_id"], 1);
    assert_eq!(users[1]["company_id"], 2);
}

#[test]
fn blank_name_is_rejected() {
    let env = TestEnv::new();
    env.cmd()
        .args(["users", "add", "  "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not be empty"));
}

#[test]
fn notifications_for_unknown_user_error() {
    let env = TestEnv::new();
    env.cmd()
        .args(["users", "notifications", "12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("User 12 not found"));
}

#[test]
fn contacts_list_searches_by_name_and_digits() {
    let env = TestEnv::with_fixture();

    env.cmd()
        .args(["contacts", "list", "--search", "dilnoza"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dilnoza Karimova"));

    env.cmd()
        .args(["contacts", "list", "--search", "1234567"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dilnoza Karimova"));

    env.cmd()
        .args(["contacts", "list", "--search", "nobody"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No contacts found."));
}
