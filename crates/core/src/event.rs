// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Events: the atomic unit exchanged between clients and the sync server.
//!
//! Every local mutation is captured as an [`Event`]. Events are:
//!
//! - Uniquely identified: `event_id` is generated client-side and is the
//!   deduplication key on both ends of the wire.
//! - Causally ordered: `(lamport_clock, node_id)` gives a total order that
//!   every node computes identically.
//! - Opaque: the `payload` belongs to the aggregate that consumes it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Globally unique event identifier (UUID v4 text form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        EventId(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::InvalidEventId(s.to_string()));
        }
        Ok(EventId(s.to_string()))
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId(s.to_string())
    }
}

/// The kind of domain object an event mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregateKind {
    Project,
    Feature,
    WorkPackage,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Project => "project",
            AggregateKind::Feature => "feature",
            AggregateKind::WorkPackage => "work-package",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed set of event variants understood by the engine.
///
/// The engine never interprets payloads; the variant only tells consumers
/// which aggregate kind and which lifecycle step the payload describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    FeatureCreated,
    FeatureUpdated,
    FeatureDeleted,
    WorkPackageCreated,
    WorkPackageUpdated,
    /// A work package changed lane (planned, doing, for review, done).
    WorkPackageMoved,
    WorkPackageDeleted,
}

impl EventType {
    /// All variants, in declaration order.
    pub const ALL: [EventType; 10] = [
        EventType::ProjectCreated,
        EventType::ProjectUpdated,
        EventType::ProjectDeleted,
        EventType::FeatureCreated,
        EventType::FeatureUpdated,
        EventType::FeatureDeleted,
        EventType::WorkPackageCreated,
        EventType::WorkPackageUpdated,
        EventType::WorkPackageMoved,
        EventType::WorkPackageDeleted,
    ];

    /// Returns the string representation used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProjectCreated => "project-created",
            EventType::ProjectUpdated => "project-updated",
            EventType::ProjectDeleted => "project-deleted",
            EventType::FeatureCreated => "feature-created",
            EventType::FeatureUpdated => "feature-updated",
            EventType::FeatureDeleted => "feature-deleted",
            EventType::WorkPackageCreated => "work-package-created",
            EventType::WorkPackageUpdated => "work-package-updated",
            EventType::WorkPackageMoved => "work-package-moved",
            EventType::WorkPackageDeleted => "work-package-deleted",
        }
    }

    /// Returns the aggregate kind this event applies to.
    pub fn aggregate_kind(&self) -> AggregateKind {
        match self {
            EventType::ProjectCreated | EventType::ProjectUpdated | EventType::ProjectDeleted => {
                AggregateKind::Project
            }
            EventType::FeatureCreated | EventType::FeatureUpdated | EventType::FeatureDeleted => {
                AggregateKind::Feature
            }
            EventType::WorkPackageCreated
            | EventType::WorkPackageUpdated
            | EventType::WorkPackageMoved
            | EventType::WorkPackageDeleted => AggregateKind::WorkPackage,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| Error::InvalidEventType(s.to_string()))
    }
}

/// Delivery state of a queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Waiting to be leased by a transport.
    Pending,
    /// Leased by the uploader or the realtime channel.
    InFlight,
    /// Accepted by the server. Terminal; never mutated again.
    Acknowledged,
    /// Rejected too many times; needs an explicit retry.
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::InFlight => "in_flight",
            SyncState::Acknowledged => "acknowledged",
            SyncState::Failed => "failed",
        }
    }

    /// Returns true if the entry still counts toward queue depth.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, SyncState::Pending | SyncState::InFlight)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "in_flight" => Ok(SyncState::InFlight),
            "acknowledged" => Ok(SyncState::Acknowledged),
            "failed" => Ok(SyncState::Failed),
            _ => Err(Error::InvalidSyncState(s.to_string())),
        }
    }
}

/// A single change to one aggregate, produced by one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub event_type: EventType,
    pub aggregate_id: String,
    /// Causal ordering key, monotonically increasing per `node_id`.
    pub lamport_clock: u64,
    pub node_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    /// Creates an event with a freshly generated id.
    pub fn new(
        event_type: EventType,
        aggregate_id: impl Into<String>,
        lamport_clock: u64,
        node_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Event {
            event_id: EventId::generate(),
            event_type,
            aggregate_id: aggregate_id.into(),
            lamport_clock,
            node_id: node_id.into(),
            payload,
        }
    }

    /// Total causal order: lamport clock, then node id, then event id.
    ///
    /// The event id comparison only matters if a node ever reused a clock
    /// value, which the queue rejects as corruption.
    pub fn causal_cmp(&self, other: &Event) -> Ordering {
        self.lamport_clock
            .cmp(&other.lamport_clock)
            .then_with(|| self.node_id.cmp(&other.node_id))
            .then_with(|| self.event_id.cmp(&other.event_id))
    }

    /// Returns an error if `other` carries the same id with different content.
    pub fn check_consistent(&self, other: &Event) -> Result<()> {
        if self.event_id == other.event_id && self != other {
            return Err(Error::DivergentEvent(self.event_id.to_string()));
        }
        Ok(())
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.causal_cmp(other)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
