// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline queue of locally created events awaiting delivery.
//!
//! Entries are kept in the `queue` table in local insertion order, which is
//! independent of Lamport order. Lifecycle:
//!
//! ```text
//! pending ──lease──► in_flight ──ack──► acknowledged (archived)
//!    ▲                   │
//!    ├──requeue──────────┤   transport failure, no penalty
//!    ├──fail─────────────┘   rejected, failure count + 1
//!    │                       (parked as failed at the limit)
//!    └──retry_failed── failed
//! ```
//!
//! The batch uploader and the realtime channel are both consumers: each
//! leases a disjoint batch and reports the outcome back. Every call is one
//! immediate transaction, so the queue is crash-safe between calls.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

use tandem_core::protocol::EventResult;
use tandem_core::{ClockSource, Event, EventId, EventType, SyncState};

use crate::error::{Error, Result, SyncError};
use crate::store::{clock_from_sql, clock_to_sql, load_clock, save_clock, Store};

const COLUMNS: &str = "seq, event_id, event_type, aggregate_id, lamport_clock, node_id, \
                       payload, state, failures, last_error, created_at, leased_at";

/// A local change not yet stamped with a Lamport clock.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_id: EventId,
    pub event_type: EventType,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
}

impl NewEvent {
    /// Creates a change with a freshly generated event id.
    pub fn new(
        event_type: EventType,
        aggregate_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        NewEvent {
            event_id: EventId::generate(),
            event_type,
            aggregate_id: aggregate_id.into(),
            payload,
        }
    }

    /// Uses a caller-chosen id, e.g. when retrying an enqueue.
    pub fn with_id(mut self, event_id: EventId) -> Self {
        self.event_id = event_id;
        self
    }

    fn matches(&self, event: &Event) -> bool {
        self.event_type == event.event_type
            && self.aggregate_id == event.aggregate_id
            && self.payload == event.payload
    }
}

/// One row of the offline queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Local insertion order.
    pub seq: i64,
    pub event: Event,
    pub state: SyncState,
    /// Deliveries the server rejected.
    pub failures: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub leased_at: Option<DateTime<Utc>>,
}

/// Entry counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub acknowledged: usize,
    pub failed: usize,
}

/// Outcome of [`OfflineQueue::settle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settlement {
    pub acknowledged: usize,
    /// Rejections recorded, including those that parked an entry.
    pub rejected: usize,
    pub requeued: usize,
    /// Entries parked as `failed` by this settlement.
    pub failed: Vec<EventId>,
}

impl QueueCounts {
    /// Entries still owed to the server.
    pub fn depth(&self) -> usize {
        self.pending + self.in_flight
    }
}

/// Row as stored, before validation.
struct RawEntry {
    seq: i64,
    event_id: String,
    event_type: String,
    aggregate_id: String,
    lamport_clock: i64,
    node_id: String,
    payload: String,
    state: String,
    failures: i64,
    last_error: Option<String>,
    created_at: String,
    leased_at: Option<String>,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawEntry {
            seq: row.get(0)?,
            event_id: row.get(1)?,
            event_type: row.get(2)?,
            aggregate_id: row.get(3)?,
            lamport_clock: row.get(4)?,
            node_id: row.get(5)?,
            payload: row.get(6)?,
            state: row.get(7)?,
            failures: row.get(8)?,
            last_error: row.get(9)?,
            created_at: row.get(10)?,
            leased_at: row.get(11)?,
        })
    }

    fn decode(self) -> Result<QueueEntry> {
        let seq = self.seq;
        let corrupt = |what: &str, value: &str| {
            Error::Sync(SyncError::QueueCorruption(format!(
                "row {seq}: invalid {what} '{value}'"
            )))
        };

        let event = Event {
            event_id: self
                .event_id
                .parse()
                .map_err(|_| corrupt("event id", &self.event_id))?,
            event_type: self
                .event_type
                .parse()
                .map_err(|_| corrupt("event type", &self.event_type))?,
            aggregate_id: self.aggregate_id,
            lamport_clock: clock_from_sql(self.lamport_clock)?,
            node_id: self.node_id,
            payload: serde_json::from_str(&self.payload)
                .map_err(|_| corrupt("payload", &self.payload))?,
        };
        Ok(QueueEntry {
            seq,
            event,
            state: self.state.parse().map_err(|_| corrupt("state", &self.state))?,
            failures: u32::try_from(self.failures)
                .map_err(|_| corrupt("failure count", &self.failures.to_string()))?,
            last_error: self.last_error,
            created_at: parse_timestamp(&self.created_at)
                .ok_or_else(|| corrupt("created_at", &self.created_at))?,
            leased_at: match self.leased_at {
                None => None,
                Some(raw) => {
                    Some(parse_timestamp(&raw).ok_or_else(|| corrupt("leased_at", &raw))?)
                }
            },
        })
    }
}

/// Fixed-width UTC timestamps so stored values compare as strings.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn ack_in(tx: &Transaction<'_>, event_ids: &[EventId], now: &str) -> Result<usize> {
    let mut changed = 0;
    for id in event_ids {
        changed += tx.execute(
            "UPDATE queue SET state = 'acknowledged', acked_at = ?1,
             leased_at = NULL, last_error = NULL
             WHERE event_id = ?2 AND state IN ('pending', 'in_flight')",
            params![now, id.as_str()],
        )?;
    }
    Ok(changed)
}

fn requeue_in(tx: &Transaction<'_>, event_ids: &[EventId]) -> Result<usize> {
    let mut changed = 0;
    for id in event_ids {
        changed += tx.execute(
            "UPDATE queue SET state = 'pending', leased_at = NULL
             WHERE event_id = ?1 AND state = 'in_flight'",
            params![id.as_str()],
        )?;
    }
    Ok(changed)
}

fn fail_in(
    tx: &Transaction<'_>,
    rejected: &[(EventId, String)],
    max_failures: u32,
) -> Result<Vec<EventId>> {
    let mut parked = Vec::new();
    for (id, reason) in rejected {
        let state: Option<String> = tx
            .query_row(
                "UPDATE queue SET failures = failures + 1, last_error = ?1,
                 leased_at = NULL,
                 state = CASE WHEN failures + 1 >= ?2 THEN 'failed' ELSE 'pending' END
                 WHERE event_id = ?3 AND state = 'in_flight'
                 RETURNING state",
                params![reason, max_failures, id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match state.as_deref() {
            Some(state) if state == SyncState::Failed.as_str() => {
                tracing::warn!(event_id = %id, reason = %reason, "event failed permanently");
                parked.push(id.clone());
            }
            Some(_) => tracing::debug!(event_id = %id, reason = %reason, "event rejected"),
            None => {}
        }
    }
    Ok(parked)
}

/// Durable, ordered queue of local events.
#[derive(Clone)]
pub struct OfflineQueue {
    store: Arc<Store>,
    node_id: String,
    clock: Arc<dyn ClockSource>,
}

impl OfflineQueue {
    pub fn new(store: Arc<Store>, node_id: impl Into<String>, clock: Arc<dyn ClockSource>) -> Self {
        OfflineQueue {
            store,
            node_id: node_id.into(),
            clock,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Appends a local change as `pending`, stamped with the next Lamport value.
    ///
    /// The row and the advanced clock are committed together before this
    /// returns. Enqueueing an id that is already queued with the same content
    /// returns the stored event unchanged; different content is corruption.
    pub fn enqueue(&self, change: NewEvent) -> Result<Event> {
        let now = timestamp(self.clock.now());
        self.store.write(|tx| {
            let existing = tx
                .query_row(
                    &format!("SELECT {COLUMNS} FROM queue WHERE event_id = ?1"),
                    params![change.event_id.as_str()],
                    RawEntry::from_row,
                )
                .optional()?;
            if let Some(raw) = existing {
                let entry = raw.decode()?;
                if !change.matches(&entry.event) {
                    return Err(Error::Sync(SyncError::QueueCorruption(format!(
                        "event {} is already queued with different content",
                        change.event_id
                    ))));
                }
                tracing::debug!(event_id = %change.event_id, "event already queued");
                return Ok(entry.event);
            }

            let mut clock = load_clock(tx)?;
            let event = Event {
                event_id: change.event_id.clone(),
                event_type: change.event_type,
                aggregate_id: change.aggregate_id.clone(),
                lamport_clock: clock.tick(),
                node_id: self.node_id.clone(),
                payload: change.payload.clone(),
            };
            save_clock(tx, &clock)?;

            tx.execute(
                "INSERT INTO queue (event_id, event_type, aggregate_id, lamport_clock,
                 node_id, payload, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
                params![
                    event.event_id.as_str(),
                    event.event_type.as_str(),
                    event.aggregate_id,
                    clock_to_sql(event.lamport_clock)?,
                    event.node_id,
                    serde_json::to_string(&event.payload)?,
                    now,
                ],
            )?;
            tracing::debug!(event_id = %event.event_id, lamport = event.lamport_clock, "enqueued");
            Ok(event)
        })
    }

    /// Marks up to `max_count` pending entries `in_flight` and returns them
    /// in insertion order.
    ///
    /// Concurrent callers never receive the same entry.
    pub fn lease_batch(&self, max_count: usize) -> Result<Vec<QueueEntry>> {
        self.lease_after(0, max_count)
    }

    /// Like [`lease_batch`](Self::lease_batch), but only considers entries
    /// inserted after `after_seq`.
    ///
    /// A drain walks the queue forward with this so that an entry returned
    /// to `pending` is not attempted twice in one pass.
    pub fn lease_after(&self, after_seq: i64, max_count: usize) -> Result<Vec<QueueEntry>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let limit = i64::try_from(max_count).unwrap_or(i64::MAX);
        self.store.write(|tx| {
            let raws = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {COLUMNS} FROM queue WHERE state = 'pending' AND seq > ?1
                     ORDER BY seq LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(params![after_seq, limit], RawEntry::from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };

            let mut leased = Vec::with_capacity(raws.len());
            for raw in raws {
                let mut entry = raw.decode()?;
                tx.execute(
                    "UPDATE queue SET state = 'in_flight', leased_at = ?1 WHERE seq = ?2",
                    params![timestamp(now), entry.seq],
                )?;
                entry.state = SyncState::InFlight;
                entry.leased_at = Some(now);
                leased.push(entry);
            }
            if !leased.is_empty() {
                tracing::debug!(count = leased.len(), "leased batch");
            }
            Ok(leased)
        })
    }

    /// Marks entries delivered. Returns how many changed state.
    ///
    /// Ids that are unknown or already acknowledged are ignored, so calling
    /// this twice is harmless.
    pub fn ack(&self, event_ids: &[EventId]) -> Result<usize> {
        let now = timestamp(self.clock.now());
        self.store.write(|tx| ack_in(tx, event_ids, &now))
    }

    /// Returns in-flight entries to `pending` without counting a failure.
    ///
    /// Used when delivery could not be attempted or its outcome is unknown.
    pub fn requeue(&self, event_ids: &[EventId]) -> Result<usize> {
        self.store.write(|tx| requeue_in(tx, event_ids))
    }

    /// Records a rejected delivery for each in-flight entry.
    ///
    /// Entries go back to `pending` until their failure count reaches
    /// `max_failures`, after which they are parked as `failed`. Returns the
    /// ids parked by this call.
    pub fn fail(&self, rejected: &[(EventId, String)], max_failures: u32) -> Result<Vec<EventId>> {
        self.store.write(|tx| fail_in(tx, rejected, max_failures))
    }

    /// Applies the server's per-event outcome for a leased batch in one
    /// transaction.
    ///
    /// Accepted and duplicate events are acknowledged, rejected ones are
    /// failed, and leased events the server did not mention are requeued.
    pub fn settle(
        &self,
        leased: &[QueueEntry],
        results: &[EventResult],
        max_failures: u32,
    ) -> Result<Settlement> {
        let by_id: HashMap<&EventId, &EventResult> =
            results.iter().map(|r| (&r.event_id, r)).collect();

        let mut delivered = Vec::new();
        let mut rejected = Vec::new();
        let mut unanswered = Vec::new();
        for entry in leased {
            let id = &entry.event.event_id;
            match by_id.get(id) {
                Some(result) if result.status.is_delivered() => delivered.push(id.clone()),
                Some(result) => rejected.push((
                    id.clone(),
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| "rejected by server".to_string()),
                )),
                None => unanswered.push(id.clone()),
            }
        }

        let now = timestamp(self.clock.now());
        self.store.write(|tx| {
            let acknowledged = ack_in(tx, &delivered, &now)?;
            let requeued = requeue_in(tx, &unanswered)?;
            let failed = fail_in(tx, &rejected, max_failures)?;
            Ok(Settlement {
                acknowledged,
                rejected: rejected.len(),
                requeued,
                failed,
            })
        })
    }

    /// Count of `pending` + `in_flight` entries.
    pub fn depth(&self) -> Result<usize> {
        Ok(self.counts()?.depth())
    }

    /// Entry counts by state.
    pub fn counts(&self) -> Result<QueueCounts> {
        self.store.read(|conn| {
            let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM queue GROUP BY state")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut counts = QueueCounts::default();
            for (state, n) in rows {
                let n = usize::try_from(n).unwrap_or(0);
                match state.parse::<SyncState>()? {
                    SyncState::Pending => counts.pending = n,
                    SyncState::InFlight => counts.in_flight = n,
                    SyncState::Acknowledged => counts.acknowledged = n,
                    SyncState::Failed => counts.failed = n,
                }
            }
            Ok(counts)
        })
    }

    /// Looks up one entry by event id.
    pub fn get(&self, event_id: &EventId) -> Result<Option<QueueEntry>> {
        let raw = self.store.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM queue WHERE event_id = ?1"),
                    params![event_id.as_str()],
                    RawEntry::from_row,
                )
                .optional()?)
        })?;
        raw.map(RawEntry::decode).transpose()
    }

    /// Entries parked as `failed`, oldest first.
    pub fn failed(&self) -> Result<Vec<QueueEntry>> {
        self.select_where("state = 'failed'")
    }

    /// Re-arms every failed entry: back to `pending` with a clean failure count.
    pub fn retry_failed(&self) -> Result<usize> {
        self.store.write(|tx| {
            let changed = tx.execute(
                "UPDATE queue SET state = 'pending', failures = 0, last_error = NULL
                 WHERE state = 'failed'",
                [],
            )?;
            Ok(changed)
        })
    }

    /// Requeues in-flight entries leased before `leased_before`.
    ///
    /// A lease has no owner that survives the process, so anything still in
    /// flight after the grace window belongs to a process that died.
    pub fn recover_abandoned(&self, leased_before: DateTime<Utc>) -> Result<usize> {
        self.store.write(|tx| {
            let changed = tx.execute(
                "UPDATE queue SET state = 'pending', leased_at = NULL
                 WHERE state = 'in_flight' AND (leased_at IS NULL OR leased_at < ?1)",
                params![timestamp(leased_before)],
            )?;
            if changed > 0 {
                tracing::info!(count = changed, "recovered abandoned leases");
            }
            Ok(changed)
        })
    }

    /// Checks queue invariants without repairing anything.
    ///
    /// Every row must decode, this node's Lamport stamps must strictly
    /// increase in insertion order, and the persisted clock must not lag the
    /// newest stamp. Returns the number of rows checked.
    pub fn verify(&self) -> Result<usize> {
        let entries = self.select_where("1 = 1")?;
        let clock = self.store.lamport()?;

        let mut last: Option<(i64, u64)> = None;
        for entry in entries.iter().filter(|e| e.event.node_id == self.node_id) {
            if let Some((seq, lamport)) = last {
                if entry.event.lamport_clock <= lamport {
                    return Err(Error::Sync(SyncError::QueueCorruption(format!(
                        "row {} has lamport {} after row {} with lamport {}",
                        entry.seq, entry.event.lamport_clock, seq, lamport
                    ))));
                }
            }
            last = Some((entry.seq, entry.event.lamport_clock));
        }
        if let Some((seq, lamport)) = last {
            if clock < lamport {
                return Err(Error::Sync(SyncError::QueueCorruption(format!(
                    "clock {clock} lags row {seq} with lamport {lamport}"
                ))));
            }
        }
        Ok(entries.len())
    }

    fn select_where(&self, filter: &str) -> Result<Vec<QueueEntry>> {
        let raws = self.store.read(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM queue WHERE {filter} ORDER BY seq"))?;
            let rows = stmt
                .query_map([], RawEntry::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        raws.into_iter().map(RawEntry::decode).collect()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
