// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `tandem auth`.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::common::*;

#[test]
fn status_without_session() {
    let home = home();
    tandem(&home)
        .args(["auth", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("State: unauthenticated"))
        .stdout(predicate::str::contains("Not logged in"));
}

#[test]
fn status_json_without_session() {
    let home = home();
    let output = tandem(&home)
        .args(["auth", "status", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["state"], "unauthenticated");
    assert!(value["username"].is_null());
}

#[test]
fn logout_is_idempotent() {
    let home = home();
    for _ in 0..2 {
        tandem(&home)
            .args(["auth", "logout"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Not logged in"));
    }
}

#[test]
fn login_without_server_fails() {
    let home = home();
    tandem(&home)
        .args(["auth", "login", "-u", "ada"])
        .write_stdin("secret\n")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no server configured"))
        .stderr(predicate::str::contains("config.toml"));
}

#[test]
fn login_rejects_non_http_server() {
    let home = home();
    tandem(&home)
        .args(["auth", "login", "-u", "ada", "--server", "ftp://sync.test"])
        .write_stdin("secret\n")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid server URL"));
}

#[test]
fn login_requires_password() {
    let home = home();
    tandem(&home)
        .args(["auth", "login", "-u", "ada", "--server", "https://sync.test"])
        .write_stdin("")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no password given"));
}

#[test]
fn login_to_unreachable_server_is_network_error() {
    let home = home_with_config(&format!("server_url = \"{}\"\n", unreachable_server()));
    tandem(&home)
        .args(["auth", "login", "-u", "ada"])
        .env("TANDEM_PASSWORD", "secret")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("network unavailable"));

    // Nothing is persisted on failure
    assert!(!home.path().join("credentials.json").exists());
    tandem(&home)
        .args(["auth", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in"));
}

#[test]
fn invalid_config_is_reported() {
    let home = home_with_config("server_url = 42\n");
    tandem(&home)
        .args(["auth", "status"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config error"));
}
