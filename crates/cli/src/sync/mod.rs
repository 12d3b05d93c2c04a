// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side sync with the tandem server.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────┐
//!   record ───────►│ OfflineQueue │ (sqlite, leased in batches)
//!                  └──────┬───────┘
//!              lease      │      lease
//!          ┌──────────────┴──────────────┐
//!          ▼                             ▼
//!   ┌─────────────┐               ┌─────────────────┐
//!   │  Uploader   │ REST          │ RealtimeChannel │ stream
//!   │ (push/pull) │               │   (Transport)   │
//!   └──────┬──────┘               └────────┬────────┘
//!          │       remote events           │
//!          └──────────► LocalView ◄────────┘
//! ```
//!
//! Both consumers lease disjoint batches from the same queue, so `sync now`
//! and a running channel never deliver the same entry twice.

mod channel;
mod connection;
mod engine;
mod queue;
mod transport;
mod uploader;

pub use channel::RealtimeChannel;
pub use connection::{Backoff, Connectivity, SharedConnectionState};
pub use engine::{SyncEngine, SyncReport, SyncStatus};
pub use queue::{NewEvent, OfflineQueue, QueueCounts, QueueEntry, Settlement};
pub use transport::{Transport, TransportError, TransportResult, WebSocketTransport};
pub use uploader::{PullReport, PushReport, Uploader};
