// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic ordering of events from multiple nodes.
//!
//! Order rules:
//! - Lower `lamport_clock` first
//! - Equal clocks: lower `node_id` first (stable, arbitrary tie-break)
//!
//! The tie-break is a deterministic choice, not a merge of intent: two
//! concurrent edits are both kept and the later one in this order wins in any
//! fold that overwrites. The resolver never rejects an event, and applying
//! an already-seen `event_id` is a no-op.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::Result;
use crate::event::{Event, EventId};

/// Compares two events by causal order.
pub fn compare(a: &Event, b: &Event) -> Ordering {
    a.causal_cmp(b)
}

/// Sorts events into causal order in place.
pub fn order(events: &mut [Event]) {
    events.sort_by(compare);
}

/// Trait for applying events idempotently.
pub trait Merge {
    /// Applies an event.
    ///
    /// Returns Ok(true) if the event changed local state, Ok(false) if it was
    /// already applied.
    fn apply(&mut self, event: &Event) -> Result<bool>;

    /// Applies multiple events.
    ///
    /// Returns the number of events that were actually applied.
    fn apply_all(&mut self, events: &[Event]) -> Result<usize> {
        let mut applied = 0;
        for event in events {
            if self.apply(event)? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}

/// In-memory view of one aggregate: its events kept in causal order.
///
/// The aggregate's state is whatever the consumer folds out of
/// [`AggregateView::events`]; the view only guarantees the order.
#[derive(Debug, Clone, Default)]
pub struct AggregateView {
    aggregate_id: String,
    events: Vec<Event>,
    applied: HashMap<EventId, usize>,
}

impl AggregateView {
    /// Creates an empty view.
    pub fn new(aggregate_id: impl Into<String>) -> Self {
        AggregateView {
            aggregate_id: aggregate_id.into(),
            events: Vec::new(),
            applied: HashMap::new(),
        }
    }

    /// Builds a view from events in any order.
    pub fn from_events(aggregate_id: impl Into<String>, events: Vec<Event>) -> Result<Self> {
        let mut view = AggregateView::new(aggregate_id);
        view.apply_all(&events)?;
        Ok(view)
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    /// Events in causal order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns true if an event with this id has been applied.
    pub fn contains(&self, id: &EventId) -> bool {
        self.applied.contains_key(id)
    }

    /// The event that sorts last, if any.
    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Folds the events in causal order.
    pub fn fold<S, F>(&self, init: S, f: F) -> S
    where
        F: FnMut(S, &Event) -> S,
    {
        self.events.iter().fold(init, f)
    }

    fn reindex(&mut self, from: usize) {
        for (i, e) in self.events.iter().enumerate().skip(from) {
            self.applied.insert(e.event_id.clone(), i);
        }
    }
}

impl Merge for AggregateView {
    fn apply(&mut self, event: &Event) -> Result<bool> {
        if let Some(&idx) = self.applied.get(&event.event_id) {
            self.events[idx].check_consistent(event)?;
            return Ok(false);
        }

        // Late arrivals are inserted at their causal position
        let pos = self
            .events
            .binary_search_by(|probe| compare(probe, event))
            .unwrap_or_else(|p| p);
        self.events.insert(pos, event.clone());
        self.reindex(pos);
        Ok(true)
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
