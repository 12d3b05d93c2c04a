// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tandem-core: shared model for the tandem sync engine.
//!
//! This crate holds the pieces that have no I/O of their own: the [`Event`]
//! model, the Lamport clock, the order resolver and the wire protocol spoken
//! with the sync server. The engine itself lives in the `tandem` crate.

pub mod clock;
pub mod error;
pub mod event;
pub mod lamport;
pub mod protocol;
pub mod resolver;

pub use clock::{ClockSource, SystemClock};
pub use error::{Error, Result};
pub use event::{AggregateKind, Event, EventId, EventType, SyncState};
pub use lamport::LamportClock;
pub use resolver::{AggregateView, Merge};
