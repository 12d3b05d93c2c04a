// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration and state directory layout.
//!
//! Configuration is read from `config.toml` in the state directory. The
//! engine never writes it; a missing file means defaults with no server.
//!
//! ```toml
//! server_url = "https://sync.example.com"
//!
//! [sync]
//! batch_size = 500
//! heartbeat_interval_ms = 15000
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::env;
use crate::error::{Error, Result};

const STATE_DIR_NAME: &str = "tandem";
const CONFIG_FILE_NAME: &str = "config.toml";
const CREDENTIALS_FILE_NAME: &str = "credentials.json";
const DB_FILE_NAME: &str = "sync.db";

/// Largest batch the server accepts on the batch endpoint.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Client configuration stored in `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the sync server, e.g. `https://sync.example.com`.
    pub server_url: Option<String>,
    /// Overrides the generated node id.
    pub node_id: Option<String>,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Tuning knobs for the uploader and realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Events per upload batch, capped at [`MAX_BATCH_SIZE`] (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Failed deliveries before an event is parked as failed (default: 5).
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Attempts per HTTP request before giving up (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds (default: 100).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Backoff ceiling in seconds (default: 30).
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Heartbeat ping interval in milliseconds (default: 15000). 0 = disabled.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Max time to wait for a pong in milliseconds (default: 10000).
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Age after which an in-flight lease is considered abandoned (default: 30).
    #[serde(default = "default_in_flight_grace_secs")]
    pub in_flight_grace_secs: u64,
    /// Budget for the final drain on shutdown in milliseconds (default: 3000).
    #[serde(default = "default_shutdown_drain_timeout_ms")]
    pub shutdown_drain_timeout_ms: u64,
    /// Events requested per pull page (default: 500).
    #[serde(default = "default_pull_page_size")]
    pub pull_page_size: usize,
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_max_failures() -> u32 {
    5
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_secs() -> u64 {
    30
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_in_flight_grace_secs() -> u64 {
    30
}

fn default_shutdown_drain_timeout_ms() -> u64 {
    3_000
}

fn default_pull_page_size() -> usize {
    500
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            batch_size: default_batch_size(),
            max_failures: default_max_failures(),
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            in_flight_grace_secs: default_in_flight_grace_secs(),
            shutdown_drain_timeout_ms: default_shutdown_drain_timeout_ms(),
            pull_page_size: default_pull_page_size(),
        }
    }
}

impl SyncSettings {
    /// Batch size clamped to `1..=MAX_BATCH_SIZE`.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// At least one delivery attempt is always allowed.
    pub fn effective_max_failures(&self) -> u32 {
        self.max_failures.max(1)
    }

    pub fn in_flight_grace(&self) -> Duration {
        Duration::from_secs(self.in_flight_grace_secs)
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_timeout_ms)
    }

    pub fn pull_page_size(&self) -> usize {
        self.pull_page_size.max(1)
    }
}

impl Config {
    /// Loads configuration from the given state directory.
    ///
    /// A missing file yields the defaults.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        let content = match fs::read_to_string(&config_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(Error::Config(format!("failed to read config: {}", e))),
        };
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        if let Some(url) = &config.server_url {
            validate_server_url(url)?;
        }
        Ok(config)
    }
}

/// Checks that a server URL is an absolute http(s) URL and normalizes it.
///
/// Trailing slashes are dropped so endpoint paths can be appended.
pub fn validate_server_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|e| Error::Config(format!("invalid server URL '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(trimmed.to_string()),
        _ => Err(Error::Config(format!(
            "invalid server URL '{}': must be http:// or https://",
            url
        ))),
    }
}

/// Builds the realtime stream URL for a server and an ephemeral token.
///
/// `http` maps to `ws` and `https` to `wss`.
pub fn stream_url(server_url: &str, ws_token: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(server_url)
        .map_err(|e| Error::Config(format!("invalid server URL '{}': {}", server_url, e)))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::Config(format!("cannot derive stream URL from '{}'", server_url)))?;
    url.set_path("/ws/v1/events");
    url.query_pairs_mut().clear().append_pair("token", ws_token);
    Ok(url.to_string())
}

/// Resolves the state directory.
///
/// Order: `TANDEM_HOME`, then `$XDG_STATE_HOME/tandem`, then
/// `~/.local/state/tandem`.
pub fn resolve_state_dir(tandem_home: Option<PathBuf>, xdg_state: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = tandem_home {
        return Ok(dir);
    }
    if let Some(dir) = xdg_state {
        return Ok(dir.join(STATE_DIR_NAME));
    }
    dirs::home_dir()
        .map(|home| home.join(".local").join("state").join(STATE_DIR_NAME))
        .ok_or_else(|| Error::Config("cannot determine home directory".to_string()))
}

/// Resolves the state directory from the environment.
pub fn state_dir() -> Result<PathBuf> {
    resolve_state_dir(env::tandem_home(), env::xdg_state_home())
}

/// Path to `config.toml` inside a state directory.
pub fn config_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CONFIG_FILE_NAME)
}

/// Path to the credential file inside a state directory.
pub fn credentials_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CREDENTIALS_FILE_NAME)
}

/// Path to the sync database inside a state directory.
pub fn db_path(state_dir: &Path) -> PathBuf {
    state_dir.join(DB_FILE_NAME)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
