// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime channel: a long-lived stream connection to the sync server.
//!
//! On every (re)connect the channel registers the workspace aggregates and
//! drains the offline queue before doing anything else, so events queued
//! while disconnected always reach the server ahead of newer ones. While
//! connected it:
//! - publishes newly queued events when nudged
//! - applies pushed remote events and acknowledges them
//! - heartbeats; a missed pong counts as a dead connection
//!
//! A lost connection is retried with exponential backoff. Losing the session
//! stops the channel in the `unauthenticated` state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tandem_core::protocol::{ClientMessage, EventResult, ServerMessage};
use tandem_core::{Event, EventId};

use super::connection::{Backoff, Connectivity, SharedConnectionState};
use super::queue::OfflineQueue;
use super::transport::{Transport, TransportError};
use crate::api::Api;
use crate::auth::AuthManager;
use crate::config::{stream_url, SyncSettings};
use crate::error::{AuthError, Error, Result};
use crate::store::Store;
use crate::view::LocalView;

/// Errors after which reconnecting may help.
fn is_transient(err: &Error) -> bool {
    matches!(
        err,
        Error::Transport(_) | Error::Server(_) | Error::Auth(AuthError::NetworkUnavailable(_))
    )
}

/// Resolves at `deadline`; never resolves without one.
async fn heartbeat_due(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Realtime connection to the sync server over a [`Transport`].
pub struct RealtimeChannel<A, T> {
    auth: Arc<AuthManager<A>>,
    queue: OfflineQueue,
    view: LocalView,
    store: Arc<Store>,
    settings: SyncSettings,
    transport: T,
    state: Arc<SharedConnectionState>,
    nudge: Arc<Notify>,
    /// Entries published but not yet settled.
    leased: Vec<EventId>,
    next_batch_id: u64,
    next_ping_id: u64,
    /// Outstanding ping and when it was sent.
    pending_ping: Option<(u64, Instant)>,
    /// None while heartbeats are disabled.
    next_ping_at: Option<Instant>,
}

impl<A: Api, T: Transport> RealtimeChannel<A, T> {
    pub fn new(
        auth: Arc<AuthManager<A>>,
        queue: OfflineQueue,
        view: LocalView,
        store: Arc<Store>,
        settings: SyncSettings,
        transport: T,
    ) -> Self {
        RealtimeChannel {
            auth,
            queue,
            view,
            store,
            settings,
            transport,
            state: Arc::new(SharedConnectionState::new()),
            nudge: Arc::new(Notify::new()),
            leased: Vec::new(),
            next_batch_id: 0,
            next_ping_id: 0,
            pending_ping: None,
            next_ping_at: None,
        }
    }

    /// Connectivity shared with observers.
    pub fn state(&self) -> Arc<SharedConnectionState> {
        Arc::clone(&self.state)
    }

    /// Handle that wakes the channel to publish newly queued events.
    pub fn nudger(&self) -> Arc<Notify> {
        Arc::clone(&self.nudge)
    }

    /// Next ping time counted from now, or None when the interval is 0.
    fn schedule_ping(&self) -> Option<Instant> {
        match self.settings.heartbeat_interval_ms {
            0 => None,
            ms => Some(Instant::now() + Duration::from_millis(ms)),
        }
    }

    fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.heartbeat_timeout_ms)
    }

    /// Opens the stream, registers stored aggregates and drains the queue.
    ///
    /// Returns the number of queued events delivered by the drain.
    pub async fn connect(&mut self) -> Result<usize> {
        self.state.set(Connectivity::Connecting);
        let ws = match self.auth.exchange_ws_token().await {
            Ok(ws) => ws,
            Err(e) => {
                self.state.set(Connectivity::Disconnected);
                return Err(e);
            }
        };
        let url = stream_url(&ws.server_url, &ws.token)?;
        if let Err(e) = self.transport.connect(&url).await {
            self.state.set(Connectivity::Disconnected);
            return Err(e.into());
        }
        self.state.set(Connectivity::Connected);
        self.state.set_attempt(0);
        self.pending_ping = None;
        self.next_ping_at = self.schedule_ping();
        tracing::info!(server = %ws.server_url, "realtime channel connected");

        let aggregates = self.store.registered_aggregates()?;
        if !aggregates.is_empty() {
            self.register(aggregates).await?;
        }
        self.drain().await
    }

    /// Asks the server to push events for these aggregates. Returns every
    /// aggregate the server now has registered for this connection.
    pub async fn register(&mut self, aggregate_ids: Vec<String>) -> Result<Vec<String>> {
        self.transport
            .send(ClientMessage::register(aggregate_ids))
            .await?;
        self.expect_reply("registered", |msg| match msg {
            ServerMessage::Registered { aggregate_ids } => Ok(aggregate_ids),
            other => Err(other),
        })
        .await
    }

    /// Publishes every pending entry over the stream, in queue order.
    ///
    /// Returns the number of entries acknowledged.
    pub async fn drain(&mut self) -> Result<usize> {
        let batch_size = self.settings.effective_batch_size();
        let max_failures = self.settings.effective_max_failures();
        let mut after = 0;
        let mut delivered = 0;

        loop {
            let leased = self.queue.lease_after(after, batch_size)?;
            let Some(last) = leased.last() else {
                break;
            };
            after = last.seq;
            self.leased = leased.iter().map(|e| e.event.event_id.clone()).collect();

            let events: Vec<Event> = leased.iter().map(|e| e.event.clone()).collect();
            let results = match self.publish(events).await {
                Ok(results) => results,
                Err(e) => {
                    self.release()?;
                    return Err(e);
                }
            };
            let settlement = self.queue.settle(&leased, &results, max_failures)?;
            self.leased.clear();
            delivered += settlement.acknowledged;
        }

        if delivered > 0 {
            tracing::info!(delivered, "published queued events");
        }
        Ok(delivered)
    }

    async fn publish(&mut self, events: Vec<Event>) -> Result<Vec<EventResult>> {
        self.next_batch_id += 1;
        let batch_id = self.next_batch_id;
        tracing::debug!(batch_id, size = events.len(), "publishing");
        self.transport
            .send(ClientMessage::publish(batch_id, events))
            .await?;
        self.expect_reply("published", |msg| match msg {
            ServerMessage::Published {
                batch_id: id,
                results,
            } if id == batch_id => Ok(results),
            other => Err(other),
        })
        .await
    }

    /// Waits for the reply `pick` accepts, handling anything else that
    /// arrives in between.
    async fn expect_reply<R>(
        &mut self,
        what: &str,
        mut pick: impl FnMut(ServerMessage) -> std::result::Result<R, ServerMessage>,
    ) -> Result<R> {
        let deadline = Instant::now() + self.heartbeat_timeout();
        loop {
            let received = tokio::time::timeout_at(deadline, self.transport.recv())
                .await
                .map_err(|_| TransportError::Timeout(format!("no {what} reply")))??;
            let Some(msg) = received else {
                return Err(TransportError::ConnectionClosed.into());
            };
            match pick(msg) {
                Ok(reply) => return Ok(reply),
                Err(other) => self.handle(other).await?,
            }
        }
    }

    /// Handles one unsolicited server message.
    async fn handle(&mut self, msg: ServerMessage) -> Result<()> {
        match msg {
            ServerMessage::Event { event } => {
                let applied = self.view.apply(&event)?;
                tracing::debug!(event_id = %event.event_id, applied, "remote event");
                if event.node_id == self.queue.node_id() {
                    self.queue.ack(std::slice::from_ref(&event.event_id))?;
                }
                self.transport
                    .send(ClientMessage::ack(vec![event.event_id]))
                    .await?;
            }
            ServerMessage::Pong { id } => {
                if matches!(self.pending_ping, Some((pending, _)) if pending == id) {
                    self.pending_ping = None;
                }
            }
            ServerMessage::Error { message } => {
                tracing::warn!(%message, "server error on stream");
            }
            ServerMessage::Registered { aggregate_ids } => {
                tracing::debug!(count = aggregate_ids.len(), "registration confirmed");
            }
            ServerMessage::Published { batch_id, .. } => {
                tracing::debug!(batch_id, "ignoring stale publish result");
            }
        }
        Ok(())
    }

    /// Serves a connected stream until shutdown (Ok) or failure (Err).
    async fn serve(&mut self, shutdown: &CancellationToken) -> Result<()> {
        loop {
            let ping_deadline = match self.pending_ping {
                Some((_, sent)) => Some(sent + self.heartbeat_timeout()),
                None => self.next_ping_at,
            };
            let awaiting_pong = self.pending_ping.is_some();

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),

                received = self.transport.recv() => {
                    let Some(msg) = received? else {
                        return Err(TransportError::ConnectionClosed.into());
                    };
                    // Any traffic proves the connection is alive
                    self.next_ping_at = self.schedule_ping();
                    self.handle(msg).await?;
                }

                _ = self.nudge.notified() => {
                    self.drain().await?;
                }

                _ = heartbeat_due(ping_deadline) => {
                    if awaiting_pong {
                        return Err(TransportError::Timeout("missed heartbeat".into()).into());
                    }
                    self.next_ping_id += 1;
                    let id = self.next_ping_id;
                    self.transport.send(ClientMessage::ping(id)).await?;
                    self.pending_ping = Some((id, Instant::now()));
                    self.next_ping_at = self.schedule_ping();
                }
            }
        }
    }

    /// Runs until `shutdown` is cancelled or the session is lost.
    ///
    /// Transient failures are retried forever with backoff. On shutdown
    /// the queue gets one last drain, bounded by the configured timeout.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let mut backoff = Backoff::from_settings(&self.settings);
        let mut attempt = 0;

        loop {
            let outcome = match self.connect().await {
                Ok(_) => {
                    backoff.reset();
                    attempt = 0;
                    self.serve(&shutdown).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    self.shutdown().await;
                    return Ok(());
                }
                Err(e) if is_transient(&e) => {
                    tracing::warn!(error = %e, "realtime channel disconnected");
                    self.disconnect().await?;
                }
                Err(e) => {
                    self.disconnect().await?;
                    if matches!(e, Error::Auth(_)) {
                        self.state.set(Connectivity::Unauthenticated);
                    }
                    tracing::error!(error = %e, "realtime channel stopped");
                    return Err(e);
                }
            }

            attempt += 1;
            self.state.set_attempt(attempt);
            let delay = backoff.next_delay();
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Ok(()),
            }
        }
    }

    /// Final drain, bounded by the shutdown timeout, then close.
    async fn shutdown(&mut self) {
        let timeout = self.settings.shutdown_drain_timeout();
        match tokio::time::timeout(timeout, self.drain()).await {
            Ok(Ok(delivered)) => tracing::debug!(delivered, "final drain complete"),
            Ok(Err(e)) => tracing::warn!(error = %e, "final drain failed"),
            Err(_) => tracing::warn!("final drain timed out"),
        }
        if let Err(e) = self.disconnect().await {
            tracing::warn!(error = %e, "close failed");
        }
    }

    /// Closes the stream and returns unsettled entries to the queue.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Err(e) = self.transport.disconnect().await {
            tracing::debug!(error = %e, "disconnect");
        }
        self.pending_ping = None;
        self.state.set(Connectivity::Disconnected);
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.leased.is_empty() {
            return Ok(());
        }
        let ids = std::mem::take(&mut self.leased);
        let requeued = self.queue.requeue(&ids)?;
        tracing::debug!(requeued, "returned unsettled events to queue");
        Ok(())
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
