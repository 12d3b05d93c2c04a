// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for tandem-core operations.

use thiserror::Error;

/// All possible errors that can occur in tandem-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid event type: '{0}'\n  hint: event types look like 'project-created' or 'work-package-updated'")]
    InvalidEventType(String),

    #[error("invalid sync state: '{0}'\n  hint: valid states are: pending, in_flight, acknowledged, failed")]
    InvalidSyncState(String),

    #[error("invalid event id: '{0}'")]
    InvalidEventId(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("divergent event {0}: same id, different content")]
    DivergentEvent(String),
}

/// A specialized Result type for tandem-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
