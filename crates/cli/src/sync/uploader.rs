// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response sync over the REST endpoints.
//!
//! `push` drains the offline queue in batches; `pull` fetches everything the
//! server stored after the persisted cursor. Transient failures are retried
//! with exponential backoff; auth failures are not.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use tandem_core::protocol::BatchRequest;
use tandem_core::{resolver, EventId};

use super::connection::Backoff;
use super::queue::OfflineQueue;
use super::transport::TransportError;
use crate::api::{Api, ApiError};
use crate::auth::{AuthManager, Session};
use crate::config::SyncSettings;
use crate::error::{Error, Result, SyncError};
use crate::store::Store;
use crate::view::LocalView;

/// Outcome of [`Uploader::push`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub batches: usize,
    pub acknowledged: usize,
    /// Rejections that left the entry pending for another attempt.
    pub rejected: usize,
    pub requeued: usize,
    /// Entries parked as failed during this push.
    pub failed: Vec<EventId>,
}

/// Outcome of [`Uploader::pull`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    pub received: usize,
    pub applied: usize,
    pub cursor: u64,
}

/// Batch uploader and puller.
pub struct Uploader<A> {
    auth: Arc<AuthManager<A>>,
    queue: OfflineQueue,
    view: LocalView,
    store: Arc<Store>,
    settings: SyncSettings,
}

impl<A: Api> Uploader<A> {
    pub fn new(
        auth: Arc<AuthManager<A>>,
        queue: OfflineQueue,
        view: LocalView,
        store: Arc<Store>,
        settings: SyncSettings,
    ) -> Self {
        Uploader {
            auth,
            queue,
            view,
            store,
            settings,
        }
    }

    /// Uploads every pending entry, one batch at a time, in queue order.
    ///
    /// Each entry is attempted at most once per push. On an error the
    /// current batch is returned to `pending` and earlier batches stay
    /// acknowledged.
    pub async fn push(&self) -> Result<PushReport> {
        let batch_size = self.settings.effective_batch_size();
        let max_failures = self.settings.effective_max_failures();
        let mut report = PushReport::default();
        let mut after = 0;

        loop {
            let leased = self.queue.lease_after(after, batch_size)?;
            let Some(last) = leased.last() else {
                break;
            };
            after = last.seq;

            let events: Vec<_> = leased.iter().map(|e| e.event.clone()).collect();
            let api = Arc::clone(self.auth.api());
            let response = self
                .call("upload batch", |session| {
                    let api = Arc::clone(&api);
                    let batch = BatchRequest {
                        events: events.clone(),
                    };
                    async move {
                        api.upload_batch(&session.server_url, &session.access_token, batch)
                            .await
                    }
                })
                .await;
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let ids: Vec<_> = leased.iter().map(|e| e.event.event_id.clone()).collect();
                    self.queue.requeue(&ids)?;
                    return Err(e);
                }
            };

            let settlement = self.queue.settle(&leased, &response.results, max_failures)?;
            tracing::info!(
                size = leased.len(),
                acknowledged = settlement.acknowledged,
                rejected = settlement.rejected,
                "uploaded batch"
            );
            report.batches += 1;
            report.acknowledged += settlement.acknowledged;
            report.rejected += settlement.rejected.saturating_sub(settlement.failed.len());
            report.requeued += settlement.requeued;
            report.failed.extend(settlement.failed);
        }
        Ok(report)
    }

    /// Fetches and applies every event stored after the persisted cursor.
    ///
    /// Each page is ordered by the resolver and applied before the cursor
    /// moves past it, so an interrupted pull resumes without loss and a
    /// re-fetched event is a no-op.
    pub async fn pull(&self) -> Result<PullReport> {
        let limit = self.settings.pull_page_size();
        let mut cursor = self.store.pull_cursor()?;
        let mut report = PullReport {
            cursor,
            ..PullReport::default()
        };

        loop {
            let api = Arc::clone(self.auth.api());
            let page = self
                .call("pull", |session| {
                    let api = Arc::clone(&api);
                    async move {
                        api.pull(&session.server_url, &session.access_token, cursor, limit)
                            .await
                    }
                })
                .await?;

            let mut events = page.events;
            resolver::order(&mut events);
            report.applied += self.view.apply_all(&events)?;
            report.received += events.len();

            // Our own events coming back prove delivery
            let own: Vec<_> = events
                .iter()
                .filter(|e| e.node_id == self.queue.node_id())
                .map(|e| e.event_id.clone())
                .collect();
            if !own.is_empty() {
                self.queue.ack(&own)?;
            }

            if !page.has_more || events.is_empty() {
                if page.cursor > cursor {
                    self.store.set_pull_cursor(page.cursor)?;
                    cursor = page.cursor;
                }
                break;
            }
            if page.cursor <= cursor {
                tracing::warn!(
                    cursor,
                    returned = page.cursor,
                    "pull cursor did not advance, stopping"
                );
                break;
            }
            self.store.set_pull_cursor(page.cursor)?;
            cursor = page.cursor;
        }

        report.cursor = cursor;
        tracing::info!(
            received = report.received,
            applied = report.applied,
            cursor,
            "pulled"
        );
        Ok(report)
    }

    /// Runs an authorized call, retrying transient failures.
    async fn call<T, F, Fut>(&self, what: &str, mut request: F) -> Result<T>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        let max_retries = self.settings.max_retries.max(1);
        let mut backoff = Backoff::from_settings(&self.settings);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.auth.authorized(&mut request).await? {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempts < max_retries => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "{what} failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    let last = match e {
                        ApiError::Transport(e) => e,
                        other => TransportError::ReceiveFailed(other.to_string()),
                    };
                    return Err(SyncError::RetriesExhausted { attempts, last }.into());
                }
                Err(e) => return Err(Error::Server(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
#[path = "uploader_tests.rs"]
mod tests;
