// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted auth session.
//!
//! The session file is JSON, readable and writable only by the owner. Its
//! format is private to this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Access/refresh token pair plus where and for whom it was issued.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub server_url: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expiry: DateTime<Utc>,
}

impl Session {
    /// Returns true once `now` has reached the access token's expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.access_expiry
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("server_url", &self.server_url)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_expiry", &self.access_expiry)
            .finish()
    }
}

/// Load/save lifecycle for the session, injected into the auth manager.
pub trait CredentialStore: Send + Sync {
    /// Returns the stored session, if any.
    fn load(&self) -> Result<Option<Session>>;

    /// Replaces the stored session.
    fn save(&self, session: &Session) -> Result<()>;

    /// Deletes the stored session. Returns true if one existed.
    fn clear(&self) -> Result<bool>;
}

/// Session stored as a JSON file with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCredentialStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Session>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let session = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "unreadable credentials in {}: {}\n  hint: run 'tandem auth logout' and log in again",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a half-written session
        let tmp = self.temp_path();
        {
            let mut file = create_private(&tmp)?;
            file.write_all(serde_json::to_string_pretty(session)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
