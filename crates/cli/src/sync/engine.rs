// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The sync engine: one handle over the queue, view, uploader and channel.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use tandem_core::{AggregateView, ClockSource, Event, EventType};

use super::channel::RealtimeChannel;
use super::connection::{Connectivity, SharedConnectionState};
use super::queue::{NewEvent, OfflineQueue, QueueCounts, QueueEntry};
use super::transport::Transport;
use super::uploader::{PullReport, PushReport, Uploader};
use crate::api::Api;
use crate::auth::{AuthManager, AuthState, AuthStatus};
use crate::config::SyncSettings;
use crate::error::{Error, Result, SyncError};
use crate::store::Store;
use crate::view::LocalView;

/// Result of [`SyncEngine::sync_now`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub push: PushReport,
    pub pull: PullReport,
}

/// Snapshot returned by [`SyncEngine::sync_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub auth: AuthStatus,
    pub connectivity: Connectivity,
    /// Entries still owed to the server.
    pub depth: usize,
    pub queue: QueueCounts,
    pub pull_cursor: u64,
    pub lamport_clock: u64,
    pub node_id: String,
    pub registered: Vec<String>,
}

pub struct SyncEngine<A> {
    auth: Arc<AuthManager<A>>,
    store: Arc<Store>,
    queue: OfflineQueue,
    view: LocalView,
    uploader: Uploader<A>,
    settings: SyncSettings,
    connection: Arc<SharedConnectionState>,
    nudge: Option<Arc<Notify>>,
}

impl<A: Api> SyncEngine<A> {
    /// Opens the engine over an existing store.
    ///
    /// Leases older than the grace window are returned to the queue, then
    /// the queue is verified; corruption is reported, never repaired.
    pub fn open(
        auth: Arc<AuthManager<A>>,
        store: Arc<Store>,
        settings: SyncSettings,
        clock: Arc<dyn ClockSource>,
        node_id: Option<String>,
    ) -> Result<Self> {
        let node_id = match node_id {
            Some(id) => id,
            None => store.node_id()?,
        };
        let queue = OfflineQueue::new(Arc::clone(&store), node_id.clone(), Arc::clone(&clock));
        let view = LocalView::new(Arc::clone(&store), node_id);

        let grace = chrono::Duration::from_std(settings.in_flight_grace())
            .map_err(|e| Error::Config(format!("in_flight_grace_secs: {e}")))?;
        queue.recover_abandoned(clock.now() - grace)?;
        let rows = queue.verify()?;
        tracing::debug!(rows, node = %queue.node_id(), "sync engine opened");

        let uploader = Uploader::new(
            Arc::clone(&auth),
            queue.clone(),
            view.clone(),
            Arc::clone(&store),
            settings.clone(),
        );
        Ok(SyncEngine {
            auth,
            store,
            queue,
            view,
            uploader,
            settings,
            connection: Arc::new(SharedConnectionState::new()),
            nudge: None,
        })
    }

    pub fn auth(&self) -> &Arc<AuthManager<A>> {
        &self.auth
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Records a local change: queued for delivery and applied locally.
    pub fn record(
        &self,
        event_type: EventType,
        aggregate_id: &str,
        payload: serde_json::Value,
    ) -> Result<Event> {
        if aggregate_id.trim().is_empty() {
            return Err(Error::InvalidInput("aggregate id must not be empty".into()));
        }
        let event = self
            .queue
            .enqueue(NewEvent::new(event_type, aggregate_id, payload))?;
        self.view.apply(&event)?;
        if let Some(nudge) = &self.nudge {
            nudge.notify_one();
        }
        tracing::info!(event_id = %event.event_id, event_type = %event.event_type, "recorded");
        Ok(event)
    }

    /// History of one aggregate in causal order.
    pub fn history(&self, aggregate_id: &str) -> Result<AggregateView> {
        self.view.events_for(aggregate_id)
    }

    pub async fn push(&self) -> Result<PushReport> {
        self.uploader.push().await
    }

    pub async fn pull(&self) -> Result<PullReport> {
        self.uploader.pull().await
    }

    /// Pushes, then pulls.
    ///
    /// Successful deliveries stay committed even when the call fails with
    /// `PartialFailure` because some entries are parked as failed.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        let push = self.push().await?;
        let pull = self.pull().await?;

        let failed = self.queue.failed()?;
        if !failed.is_empty() {
            return Err(SyncError::PartialFailure {
                acknowledged: push.acknowledged,
                failed: failed.into_iter().map(|e| e.event.event_id).collect(),
            }
            .into());
        }
        Ok(SyncReport { push, pull })
    }

    /// Auth state, connectivity and queue depth. Reads only.
    pub fn sync_status(&self) -> Result<SyncStatus> {
        let auth = self.auth.status();
        let connectivity = if auth.state == AuthState::Unauthenticated {
            Connectivity::Unauthenticated
        } else {
            self.connection.get()
        };
        let queue = self.queue.counts()?;
        Ok(SyncStatus {
            auth,
            connectivity,
            depth: queue.depth(),
            queue,
            pull_cursor: self.store.pull_cursor()?,
            lamport_clock: self.store.lamport()?,
            node_id: self.queue.node_id().to_string(),
            registered: self.store.registered_aggregates()?,
        })
    }

    /// Entries parked as failed.
    pub fn failed(&self) -> Result<Vec<QueueEntry>> {
        self.queue.failed()
    }

    /// Moves failed entries back to pending.
    pub fn retry_failed(&self) -> Result<usize> {
        let rearmed = self.queue.retry_failed()?;
        if rearmed > 0 {
            tracing::info!(rearmed, "failed events re-armed");
        }
        Ok(rearmed)
    }

    /// Builds a realtime channel over `transport`. The engine reports its
    /// connectivity and nudges it on every recorded event.
    pub fn channel<T: Transport>(&mut self, transport: T) -> RealtimeChannel<A, T> {
        let channel = RealtimeChannel::new(
            Arc::clone(&self.auth),
            self.queue.clone(),
            self.view.clone(),
            Arc::clone(&self.store),
            self.settings.clone(),
            transport,
        );
        self.connection = channel.state();
        self.nudge = Some(channel.nudger());
        channel
    }

    /// Persists the aggregates to receive in real time and registers the
    /// full set with the server. Registering twice is harmless.
    pub async fn register_workspace<T: Transport>(
        &mut self,
        aggregate_ids: &[String],
        transport: T,
    ) -> Result<Vec<String>> {
        if aggregate_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(Error::InvalidInput("aggregate id must not be empty".into()));
        }
        let registered = self.store.add_registered_aggregates(aggregate_ids)?;

        // connect() registers the stored set and drains the queue
        let mut channel = self.channel(transport);
        let result = channel.connect().await;
        channel.disconnect().await?;
        result?;
        tracing::info!(count = registered.len(), "workspace registered");
        Ok(registered)
    }

    /// Runs the realtime channel until `shutdown` is cancelled.
    pub async fn run_realtime<T: Transport>(
        &mut self,
        transport: T,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut channel = self.channel(transport);
        channel.run(shutdown).await
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
