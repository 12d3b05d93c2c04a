// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Lamport clock for causal ordering.
//!
//! Each node keeps one counter. It is bumped for every locally created event
//! and pulled forward whenever an event from another node is observed, so an
//! event created after seeing remote event `r` always sorts after `r`.
//!
//! Rules:
//! 1. Local event: `clock = clock + 1`
//! 2. Observed remote event with clock `r`: `clock = max(clock, r) + 1`
//!
//! Wall time plays no part in ordering.

use serde::{Deserialize, Serialize};

/// A node-local Lamport counter.
///
/// The value is plain data so it can be persisted between processes; the
/// owner is responsible for writing it back after each mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LamportClock(u64);

impl LamportClock {
    /// Restores a clock from a persisted value.
    pub fn new(value: u64) -> Self {
        LamportClock(value)
    }

    /// Returns the last issued or observed value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Advances the clock for a locally created event and returns its stamp.
    pub fn tick(&mut self) -> u64 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    /// Advances the clock past an observed remote stamp.
    pub fn observe(&mut self, remote: u64) -> u64 {
        self.0 = self.0.max(remote).saturating_add(1);
        self.0
    }
}

#[cfg(test)]
#[path = "lamport_tests.rs"]
mod tests;
