// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.
//!
//! The variable name constants are generated by `build.rs` and live in the
//! [`vars`] submodule.

use std::path::PathBuf;

/// Generated environment variable name constants.
pub mod vars {
    include!(concat!(env!("OUT_DIR"), "/env_vars.rs"));
}

/// Returns the value of `TANDEM_HOME` if set.
pub fn tandem_home() -> Option<PathBuf> {
    non_empty(vars::TANDEM_HOME).map(PathBuf::from)
}

/// Returns the value of `XDG_STATE_HOME` if set.
pub fn xdg_state_home() -> Option<PathBuf> {
    non_empty(vars::XDG_STATE_HOME).map(PathBuf::from)
}

/// Returns the value of `TANDEM_LOG_FILE` if set.
pub fn log_file() -> Option<PathBuf> {
    non_empty(vars::TANDEM_LOG_FILE).map(PathBuf::from)
}

/// Returns the value of `TANDEM_PASSWORD` if set.
///
/// Lets scripts log in without a terminal.
pub fn password() -> Option<String> {
    non_empty(vars::TANDEM_PASSWORD)
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
