// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed sync state.
//!
//! One database (`sync.db`) holds everything the engine must keep across
//! restarts:
//! - `queue`: the offline queue, in local insertion order
//! - `applied_events`: every event merged into the local view
//! - `meta`: node id, Lamport clock, pull cursor, registered aggregates
//!
//! The connection sits behind a process-wide mutex and every mutation runs
//! in an immediate transaction, so callers never observe a torn state.

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use tandem_core::LamportClock;

use crate::error::{Error, Result, SyncError};

/// SQL schema for the sync database.
pub const SCHEMA: &str = r#"
-- Offline queue; seq is the local insertion order
CREATE TABLE IF NOT EXISTS queue (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    event_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    lamport_clock INTEGER NOT NULL,
    node_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',
    failures INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL,
    leased_at TEXT,
    acked_at TEXT
);

-- Events merged into the local view, local and remote
CREATE TABLE IF NOT EXISTS applied_events (
    event_id TEXT PRIMARY KEY,
    aggregate_id TEXT NOT NULL,
    lamport_clock INTEGER NOT NULL,
    node_id TEXT NOT NULL,
    body TEXT NOT NULL,
    applied_at TEXT NOT NULL
);

-- Scalar engine state
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_state ON queue(state, seq);
CREATE INDEX IF NOT EXISTS idx_applied_order
    ON applied_events(aggregate_id, lamport_clock, node_id, event_id);
"#;

pub(crate) const META_NODE_ID: &str = "node_id";
pub(crate) const META_LAMPORT: &str = "lamport_clock";
pub(crate) const META_PULL_CURSOR: &str = "pull_cursor";
pub(crate) const META_REGISTERED: &str = "registered_aggregates";

/// Creates the schema on a database connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Converts a clock value for storage in an INTEGER column.
pub(crate) fn clock_to_sql(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| {
        Error::Sync(SyncError::QueueCorruption(format!(
            "lamport clock {value} does not fit in the database"
        )))
    })
}

/// Converts a stored INTEGER column back into a clock value.
pub(crate) fn clock_from_sql(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| {
        Error::Sync(SyncError::QueueCorruption(format!(
            "negative lamport clock {value} in database"
        )))
    })
}

pub(crate) fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

pub(crate) fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Reads the persisted Lamport clock (0 if never ticked).
pub(crate) fn load_clock(conn: &Connection) -> Result<LamportClock> {
    match get_meta(conn, META_LAMPORT)? {
        None => Ok(LamportClock::default()),
        Some(raw) => raw.parse::<u64>().map(LamportClock::new).map_err(|_| {
            Error::Sync(SyncError::QueueCorruption(format!(
                "invalid lamport clock '{raw}' in meta"
            )))
        }),
    }
}

pub(crate) fn save_clock(conn: &Connection, clock: &LamportClock) -> Result<()> {
    set_meta(conn, META_LAMPORT, &clock.value().to_string())
}

/// The sync database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open the database at the given path, creating the schema if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )?;
        run_migrations(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a read against the connection.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }

    /// Runs `f` inside an immediate transaction; commits only if it succeeds.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Returns this client's node id, generating and persisting one on first use.
    pub fn node_id(&self) -> Result<String> {
        self.write(|tx| {
            if let Some(id) = get_meta(tx, META_NODE_ID)? {
                return Ok(id);
            }
            let id = uuid::Uuid::new_v4().to_string();
            set_meta(tx, META_NODE_ID, &id)?;
            tracing::info!(node_id = %id, "generated node id");
            Ok(id)
        })
    }

    /// Current value of the persisted Lamport clock.
    pub fn lamport(&self) -> Result<u64> {
        self.read(|conn| load_clock(conn).map(|c| c.value()))
    }

    /// Server cursor after the last fully applied pull page.
    pub fn pull_cursor(&self) -> Result<u64> {
        self.read(|conn| match get_meta(conn, META_PULL_CURSOR)? {
            None => Ok(0),
            Some(raw) => raw.parse().map_err(|_| {
                Error::Sync(SyncError::QueueCorruption(format!(
                    "invalid pull cursor '{raw}' in meta"
                )))
            }),
        })
    }

    pub fn set_pull_cursor(&self, cursor: u64) -> Result<()> {
        self.write(|tx| set_meta(tx, META_PULL_CURSOR, &cursor.to_string()))
    }

    /// Aggregates this node registered for realtime delivery.
    pub fn registered_aggregates(&self) -> Result<Vec<String>> {
        self.read(|conn| match get_meta(conn, META_REGISTERED)? {
            None => Ok(Vec::new()),
            Some(raw) => Ok(serde_json::from_str(&raw)?),
        })
    }

    /// Adds aggregates to the registered set and returns the full set.
    ///
    /// Re-registering an aggregate is a no-op.
    pub fn add_registered_aggregates(&self, aggregate_ids: &[String]) -> Result<Vec<String>> {
        self.write(|tx| {
            let mut current: Vec<String> = match get_meta(tx, META_REGISTERED)? {
                None => Vec::new(),
                Some(raw) => serde_json::from_str(&raw)?,
            };
            for id in aggregate_ids {
                if !current.contains(id) {
                    current.push(id.clone());
                }
            }
            current.sort();
            set_meta(tx, META_REGISTERED, &serde_json::to_string(&current)?)?;
            Ok(current)
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
