// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connectivity state shared between the realtime task and readers, plus
//! the exponential backoff used by every retry loop.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::config::SyncSettings;

const STATE_DISCONNECTED: u8 = 0;
const STATE_CONNECTING: u8 = 1;
const STATE_CONNECTED: u8 = 2;
const STATE_UNAUTHENTICATED: u8 = 3;

/// Connectivity as reported by `sync status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Disconnected,
    Connecting,
    Connected,
    /// The channel stopped because the session is gone.
    Unauthenticated,
}

impl Connectivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connectivity::Disconnected => "disconnected",
            Connectivity::Connecting => "connecting",
            Connectivity::Connected => "connected",
            Connectivity::Unauthenticated => "unauthenticated",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Connectivity::Disconnected => STATE_DISCONNECTED,
            Connectivity::Connecting => STATE_CONNECTING,
            Connectivity::Connected => STATE_CONNECTED,
            Connectivity::Unauthenticated => STATE_UNAUTHENTICATED,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            STATE_CONNECTING => Connectivity::Connecting,
            STATE_CONNECTED => Connectivity::Connected,
            STATE_UNAUTHENTICATED => Connectivity::Unauthenticated,
            _ => Connectivity::Disconnected,
        }
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state visible to the channel task and to status readers.
///
/// Atomic fields keep reads lock-free.
#[derive(Debug)]
pub struct SharedConnectionState {
    state: AtomicU8,
    /// Reconnect attempt count (0 while connected).
    attempt: AtomicU32,
}

impl SharedConnectionState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_DISCONNECTED),
            attempt: AtomicU32::new(0),
        }
    }

    pub fn get(&self) -> Connectivity {
        Connectivity::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set(&self, state: Connectivity) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    pub fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Release);
    }
}

impl Default for SharedConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff: starts at `initial`, doubles, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_ms: u64,
    max_ms: u64,
    delay_ms: u64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial_ms = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        Backoff {
            initial_ms,
            max_ms,
            delay_ms: initial_ms.min(max_ms),
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.initial_delay_ms),
            Duration::from_secs(settings.max_delay_secs),
        )
    }

    /// Returns the delay to wait now and advances to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_millis(self.delay_ms);
        self.delay_ms = std::cmp::min(self.delay_ms.saturating_mul(2), self.max_ms);
        delay
    }

    /// Starts over after a success.
    pub fn reset(&mut self) {
        self.delay_ms = self.initial_ms.min(self.max_ms);
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
