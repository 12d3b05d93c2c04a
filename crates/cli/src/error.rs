// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use tandem_core::EventId;
use thiserror::Error;

use crate::sync::TransportError;

/// Failures of the auth session lifecycle.
///
/// None of these are retried automatically; the user has to act.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials\n  hint: check the username and password")]
    InvalidCredentials,

    #[error("session expired and could not be refreshed\n  hint: run 'tandem auth login' again")]
    ReauthRequired,

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("already logged in as {username} on {server_url}\n  hint: use 'tandem auth login --force' to replace the session")]
    AlreadyAuthenticated {
        username: String,
        server_url: String,
    },

    #[error("not logged in\n  hint: run 'tandem auth login' first")]
    NotLoggedIn,

    #[error("invalid auth state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Failures of the sync engine itself.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{} event(s) failed permanently, {acknowledged} delivered\n  hint: fix the cause and run 'tandem sync retry-failed'", .failed.len())]
    PartialFailure {
        acknowledged: usize,
        failed: Vec<EventId>,
    },

    #[error("queue corruption: {0}\n  hint: the local queue was left untouched and needs manual repair")]
    QueueCorruption(String),

    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },
}

/// All errors surfaced by the tandem library.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    InvalidInput(String),

    #[error("no server configured\n  hint: set server_url in {0} or pass --server")]
    NoServer(String),

    /// The server refused a request for a reason other than auth.
    #[error("server refused request: {0}")]
    Server(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Process exit code for this error.
    ///
    /// | code | meaning |
    /// |---|---|
    /// | 1 | usage, config, local I/O |
    /// | 2 | authentication |
    /// | 3 | some events failed permanently |
    /// | 4 | transport failure after retries |
    /// | 5 | queue corruption |
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Auth(_) => 2,
            Error::Sync(SyncError::PartialFailure { .. }) => 3,
            Error::Sync(SyncError::RetriesExhausted { .. }) | Error::Transport(_) => 4,
            Error::Sync(SyncError::QueueCorruption(_)) => 5,
            _ => 1,
        }
    }
}

/// A specialized Result type for tandem operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<tandem_core::Error> for Error {
    fn from(e: tandem_core::Error) -> Self {
        match e {
            tandem_core::Error::DivergentEvent(id) => Error::Sync(SyncError::QueueCorruption(
                format!("event {id} was seen twice with different content"),
            )),
            tandem_core::Error::Json(e) => Error::Json(e),
            other => Error::InvalidInput(other.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
