// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test files,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// A `tandem` invocation isolated from the caller's environment.
pub fn tandem(home: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("tandem").unwrap();
    cmd.env("TANDEM_HOME", home.path())
        .env_remove("TANDEM_PASSWORD")
        .env_remove("TANDEM_LOG_FILE")
        .env_remove("RUST_LOG");
    cmd
}

/// Fresh state directory with an optional `config.toml`.
pub fn home_with_config(config: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    if !config.is_empty() {
        std::fs::write(temp.path().join("config.toml"), config).unwrap();
    }
    temp
}

pub fn home() -> TempDir {
    home_with_config("")
}

/// A local URL nothing is listening on.
pub fn unreachable_server() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

/// Records an event and returns the parsed JSON output.
pub fn record(home: &TempDir, event_type: &str, aggregate: &str, payload: &str) -> serde_json::Value {
    let output = tandem(home)
        .args(["event", "record", event_type, aggregate, "-p", payload, "-o", "json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "record failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

pub fn status_json(home: &TempDir) -> serde_json::Value {
    let output = tandem(home)
        .args(["sync", "status", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}
