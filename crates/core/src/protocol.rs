// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types shared with the sync server.
//!
//! Two families live here:
//! - Realtime stream messages ([`ClientMessage`], [`ServerMessage`]), sent as
//!   JSON text frames tagged by `type`
//! - REST request/response bodies for the auth, batch and pull endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, EventId};

/// Per-event outcome reported by the server for a publish or batch upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Stored by the server.
    Accepted,
    /// Already stored; treated as accepted.
    Duplicate,
    /// Refused; the client may retry.
    Rejected,
}

impl EventStatus {
    /// Returns true if the client can consider the event delivered.
    pub fn is_delivered(&self) -> bool {
        matches!(self, EventStatus::Accepted | EventStatus::Duplicate)
    }
}

/// Outcome for one event in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResult {
    pub event_id: EventId,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventResult {
    pub fn accepted(event_id: EventId) -> Self {
        EventResult {
            event_id,
            status: EventStatus::Accepted,
            error: None,
        }
    }

    pub fn rejected(event_id: EventId, error: impl Into<String>) -> Self {
        EventResult {
            event_id,
            status: EventStatus::Rejected,
            error: Some(error.into()),
        }
    }
}

/// Messages sent from client to server on the realtime stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Deliver queued events, in queue order.
    ///
    /// The server answers with [`ServerMessage::Published`] carrying the
    /// same `batch_id`.
    Publish { batch_id: u64, events: Vec<Event> },

    /// Ask the server to push events for these aggregates to this node.
    Register { aggregate_ids: Vec<String> },

    /// Confirm receipt of pushed events.
    Ack { event_ids: Vec<EventId> },

    /// Heartbeat.
    Ping {
        /// Client-chosen ID echoed in Pong.
        id: u64,
    },
}

/// Messages sent from server to client on the realtime stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Per-event outcome of a [`ClientMessage::Publish`].
    Published {
        batch_id: u64,
        results: Vec<EventResult>,
    },

    /// Registration accepted. Lists every aggregate now registered.
    Registered { aggregate_ids: Vec<String> },

    /// An event pushed for a registered aggregate.
    Event { event: Event },

    /// Heartbeat response.
    Pong {
        /// Echoed from the Ping message.
        id: u64,
    },

    /// Error message.
    Error {
        /// Human-readable error description.
        message: String,
    },
}

impl ClientMessage {
    pub fn publish(batch_id: u64, events: Vec<Event>) -> Self {
        ClientMessage::Publish { batch_id, events }
    }

    pub fn register(aggregate_ids: Vec<String>) -> Self {
        ClientMessage::Register { aggregate_ids }
    }

    pub fn ack(event_ids: Vec<EventId>) -> Self {
        ClientMessage::Ack { event_ids }
    }

    pub fn ping(id: u64) -> Self {
        ClientMessage::Ping { id }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    pub fn published(batch_id: u64, results: Vec<EventResult>) -> Self {
        ServerMessage::Published { batch_id, results }
    }

    pub fn registered(aggregate_ids: Vec<String>) -> Self {
        ServerMessage::Registered { aggregate_ids }
    }

    pub fn event(event: Event) -> Self {
        ServerMessage::Event { event }
    }

    pub fn pong(id: u64) -> Self {
        ServerMessage::Pong { id }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// `POST /api/v1/auth/token` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

/// `POST /api/v1/auth/token` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
}

/// `POST /api/v1/auth/refresh` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `POST /api/v1/auth/refresh` response.
///
/// Servers that rotate refresh tokens return the new one; others omit it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expiry: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// `POST /api/v1/auth/ws-token` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsTokenResponse {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

/// `POST /api/v1/events/batch` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRequest {
    pub events: Vec<Event>,
}

/// `POST /api/v1/events/batch` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchResponse {
    pub results: Vec<EventResult>,
}

/// `GET /api/v1/events?cursor=N&limit=M` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullResponse {
    pub events: Vec<Event>,
    /// Cursor to pass on the next pull.
    pub cursor: u64,
    #[serde(default)]
    pub has_more: bool,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
