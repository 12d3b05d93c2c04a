// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `tandem sync` that need no running server.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::common::*;
use yare::parameterized;

#[test]
fn status_of_fresh_home() {
    let home = home();
    tandem(&home)
        .args(["sync", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Auth: unauthenticated"))
        .stdout(predicate::str::contains("Connectivity: unauthenticated"))
        .stdout(predicate::str::contains("Queue depth: 0"))
        .stdout(predicate::str::contains("Registered: none"));
}

#[test]
fn status_counts_offline_events() {
    let home = home();
    record(&home, "project-created", "proj-1", "{}");
    record(&home, "feature-created", "feat-1", "{}");

    let status = status_json(&home);
    assert_eq!(status["depth"], 2);
    assert_eq!(status["queue"]["pending"], 2);
    assert_eq!(status["lamport_clock"], 2);
    assert_eq!(status["pull_cursor"], 0);
}

#[parameterized(
    now = { "now" },
    push = { "push" },
    pull = { "pull" },
)]
fn sync_without_session_keeps_queue(subcommand: &str) {
    let home = home();
    record(&home, "project-created", "proj-1", "{}");

    tandem(&home)
        .args(["sync", subcommand])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not logged in"));

    assert_eq!(status_json(&home)["depth"], 1);
}

#[test]
fn retry_failed_with_nothing_failed() {
    let home = home();
    tandem(&home)
        .args(["sync", "retry-failed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Re-armed 0 event(s)"));
}

#[test]
fn workspace_requires_aggregates() {
    let home = home();
    tandem(&home).args(["sync", "workspace"]).assert().failure();
}

#[test]
fn workspace_without_session() {
    let home = home();
    tandem(&home)
        .args(["sync", "workspace", "proj-1"])
        .assert()
        .code(2);
}

#[test]
fn node_id_is_stable_across_runs() {
    let home = home();
    let first = status_json(&home)["node_id"].clone();
    let second = status_json(&home)["node_id"].clone();
    assert!(!first.as_str().unwrap().is_empty());
    assert_eq!(first, second);
}
