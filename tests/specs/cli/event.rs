// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `tandem event`.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::common::*;
use yare::parameterized;

#[test]
fn record_prints_event_id() {
    let home = home();
    tandem(&home)
        .args(["event", "record", "project-created", "proj-1"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Recorded "))
        .stdout(predicate::str::contains("(lamport 1)"));
}

#[test]
fn record_json_carries_payload_and_node() {
    let home = home_with_config("node_id = \"laptop\"\n");
    let event = record(&home, "feature-created", "feat-1", r#"{"name":"Login"}"#);
    assert_eq!(event["event_type"], "feature-created");
    assert_eq!(event["aggregate_id"], "feat-1");
    assert_eq!(event["node_id"], "laptop");
    assert_eq!(event["payload"]["name"], "Login");
    assert!(!event["event_id"].as_str().unwrap().is_empty());
}

#[test]
fn lamport_clock_survives_restarts() {
    let home = home();
    let first = record(&home, "work-package-created", "wp-1", "{}");
    let second = record(&home, "work-package-moved", "wp-1", "{}");
    assert_eq!(first["lamport_clock"], 1);
    assert_eq!(second["lamport_clock"], 2);
    assert_eq!(first["node_id"], second["node_id"]);
}

#[parameterized(
    unknown_type = { &["event", "record", "issue-created", "x-1"], "invalid event type" },
    bad_payload = { &["event", "record", "project-created", "p-1", "-p", "{oops"], "payload is not valid JSON" },
)]
fn record_rejects_bad_input(args: &[&str], message: &str) {
    let home = home();
    tandem(&home)
        .args(args)
        .assert()
        .code(1)
        .stderr(predicate::str::contains(message));
    assert_eq!(status_json(&home)["depth"], 0);
}

#[test]
fn record_rejects_blank_aggregate() {
    let home = home();
    tandem(&home)
        .args(["event", "record", "project-created", "  "])
        .assert()
        .failure();
}

#[test]
fn history_lists_events_in_order() {
    let home = home();
    record(&home, "work-package-created", "wp-1", r#"{"title":"Draft"}"#);
    record(&home, "work-package-updated", "wp-1", r#"{"title":"Final"}"#);
    record(&home, "project-created", "proj-1", "{}");

    let output = tandem(&home)
        .args(["event", "history", "wp-1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("work-package-created"));
    assert!(lines[1].contains("work-package-updated"));
    assert!(!stdout.contains("project-created"));
}

#[test]
fn history_json_is_array() {
    let home = home();
    record(&home, "feature-created", "feat-1", "{}");
    let output = tandem(&home)
        .args(["event", "history", "feat-1", "-o", "json"])
        .output()
        .unwrap();
    let events: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["aggregate_id"], "feat-1");
}

#[test]
fn history_of_unknown_aggregate() {
    let home = home();
    tandem(&home)
        .args(["event", "history", "nope"])
        .assert()
        .success()
        .stdout("No events\n");
}
