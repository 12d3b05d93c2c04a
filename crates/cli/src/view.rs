// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent local view of every applied event.
//!
//! The view is the client's copy of aggregate history. Events land here
//! when they are recorded locally or received from the server; replays are
//! detected through the applied-event set and ignored.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use tandem_core::{AggregateView, Event};

use crate::error::Result;
use crate::store::{clock_to_sql, load_clock, save_clock, Store};

/// Applied-event set and aggregate history backed by the sync database.
#[derive(Clone)]
pub struct LocalView {
    store: Arc<Store>,
    node_id: String,
}

impl LocalView {
    pub fn new(store: Arc<Store>, node_id: impl Into<String>) -> Self {
        LocalView {
            store,
            node_id: node_id.into(),
        }
    }

    /// Applies one event.
    ///
    /// Returns `Ok(false)` if the event was already applied. An event from
    /// another node advances the Lamport clock past its stamp in the same
    /// transaction. A replay with different content is queue corruption.
    pub fn apply(&self, event: &Event) -> Result<bool> {
        let body = serde_json::to_string(event)?;
        let remote = event.node_id != self.node_id;
        self.store.write(|tx| {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT body FROM applied_events WHERE event_id = ?1",
                    params![event.event_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing {
                let existing: Event = serde_json::from_str(&existing)?;
                existing.check_consistent(event)?;
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO applied_events
                 (event_id, aggregate_id, lamport_clock, node_id, body, applied_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.event_id.as_str(),
                    event.aggregate_id,
                    clock_to_sql(event.lamport_clock)?,
                    event.node_id,
                    body,
                    Utc::now().to_rfc3339(),
                ],
            )?;

            if remote {
                let mut clock = load_clock(tx)?;
                clock.observe(event.lamport_clock);
                save_clock(tx, &clock)?;
            }
            Ok(true)
        })
    }

    /// Applies events in order and returns how many were new.
    pub fn apply_all(&self, events: &[Event]) -> Result<usize> {
        let mut applied = 0;
        for event in events {
            if self.apply(event)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// History of one aggregate in causal order.
    pub fn events_for(&self, aggregate_id: &str) -> Result<AggregateView> {
        let events = self.store.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM applied_events WHERE aggregate_id = ?1
                 ORDER BY lamport_clock, node_id, event_id",
            )?;
            let bodies = stmt
                .query_map(params![aggregate_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let mut events = Vec::with_capacity(bodies.len());
            for body in bodies {
                events.push(serde_json::from_str::<Event>(&body)?);
            }
            Ok(events)
        })?;
        Ok(AggregateView::from_events(aggregate_id, events)?)
    }

    /// Aggregate ids with at least one applied event, sorted.
    pub fn aggregates(&self) -> Result<Vec<String>> {
        self.store.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT aggregate_id FROM applied_events ORDER BY aggregate_id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }
}

#[cfg(test)]
#[path = "view_tests.rs"]
mod tests;
