// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-process fakes shared by unit tests.
//!
//! - [`MockClock`]: a settable wall clock
//! - [`MockServer`]: a sync server implementing [`Api`] over shared state
//! - [`MockTransport`]: a realtime connection to the same server
//! - [`MemoryCredentialStore`]: a credential store without a file

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc;

use tandem_core::protocol::{
    BatchRequest, BatchResponse, ClientMessage, EventResult, EventStatus, PullResponse,
    RefreshRequest, RefreshResponse, ServerMessage, TokenRequest, TokenResponse, WsTokenResponse,
};
use tandem_core::{ClockSource, Event, EventId, EventType};

use crate::api::{Api, ApiError, ApiFuture};
use crate::auth::{AuthManager, CredentialStore, Session};
use crate::error::Result;
use crate::sync::{Transport, TransportError, TransportResult};

pub const SERVER_URL: &str = "https://sync.test";
pub const USERNAME: &str = "ada";
pub const PASSWORD: &str = "correct horse";

/// Wall clock that only moves when told to.
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<DateTime<Utc>>,
}

impl MockClock {
    pub fn new() -> Arc<Self> {
        Arc::new(MockClock {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl ClockSource for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Credential store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: Mutex<Option<Session>>,
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Session>> {
        Ok(self.session.lock().unwrap().clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        Ok(self.session.lock().unwrap().take().is_some())
    }
}

/// Per-endpoint call counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub token: usize,
    pub refresh: usize,
    pub ws_token: usize,
    pub batch: usize,
    pub pull: usize,
}

#[derive(Default)]
struct ServerState {
    users: HashMap<String, String>,
    access: HashMap<String, DateTime<Utc>>,
    refresh: HashSet<String>,
    ws_tokens: HashSet<String>,
    next_token: u64,
    access_ttl_secs: i64,
    rotate_refresh: bool,
    refresh_delay: Option<std::time::Duration>,
    /// Status every token request fails with.
    token_status: Option<u16>,

    /// Event log; the pull cursor is an index into it.
    log: Vec<Event>,
    stored: HashSet<EventId>,
    /// Remaining rejections per event id.
    reject: HashMap<EventId, usize>,
    fail_batches: usize,
    /// Pull pages claim more but never move the cursor.
    stall_pull: bool,
    offline: bool,
    calls: CallCounts,

    registered: HashSet<String>,
    connections: HashMap<u64, mpsc::UnboundedSender<ServerMessage>>,
    next_conn: u64,
    answer_pings: bool,
    ws_received: Vec<ClientMessage>,
}

/// Fake sync server shared by every fake client in a test.
#[derive(Clone)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
    clock: Arc<MockClock>,
}

impl MockServer {
    pub fn new(clock: Arc<MockClock>) -> Self {
        let mut state = ServerState {
            access_ttl_secs: 3600,
            answer_pings: true,
            ..ServerState::default()
        };
        state.users.insert(USERNAME.into(), PASSWORD.into());
        MockServer {
            state: Arc::new(Mutex::new(state)),
            clock,
        }
    }

    /// Lifetime of newly issued access tokens.
    pub fn set_access_ttl(&self, ttl: Duration) {
        self.state.lock().unwrap().access_ttl_secs = ttl.num_seconds();
    }

    pub fn set_rotate_refresh(&self, rotate: bool) {
        self.state.lock().unwrap().rotate_refresh = rotate;
    }

    /// Refresh responses arrive after `delay`.
    pub fn set_refresh_delay(&self, delay: std::time::Duration) {
        self.state.lock().unwrap().refresh_delay = Some(delay);
    }

    /// Token requests fail with this HTTP status, as a wrong URL would.
    pub fn set_token_status(&self, status: u16) {
        self.state.lock().unwrap().token_status = Some(status);
    }

    pub fn set_stall_pull(&self, stall: bool) {
        self.state.lock().unwrap().stall_pull = stall;
    }

    /// While offline every call fails with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// The next `n` batch uploads fail with 503.
    pub fn fail_next_batches(&self, n: usize) {
        self.state.lock().unwrap().fail_batches = n;
    }

    /// Rejects `times` deliveries of this event, on either path.
    pub fn reject_event(&self, id: &EventId, times: usize) {
        self.state.lock().unwrap().reject.insert(id.clone(), times);
    }

    /// Invalidates every refresh token (e.g. server-side logout).
    pub fn revoke_refresh_tokens(&self) {
        self.state.lock().unwrap().refresh.clear();
    }

    /// Invalidates every access token without touching refresh tokens.
    pub fn revoke_access_tokens(&self) {
        self.state.lock().unwrap().access.clear();
    }

    pub fn set_answer_pings(&self, answer: bool) {
        self.state.lock().unwrap().answer_pings = answer;
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    /// Server cursor: number of events stored.
    pub fn cursor(&self) -> u64 {
        self.state.lock().unwrap().log.len() as u64
    }

    pub fn log(&self) -> Vec<Event> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn registered(&self) -> HashSet<String> {
        self.state.lock().unwrap().registered.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().unwrap().connections.len()
    }

    /// Messages received over realtime connections.
    pub fn ws_received(&self) -> Vec<ClientMessage> {
        self.state.lock().unwrap().ws_received.clone()
    }

    /// Stores an event from another node and pushes it to registered
    /// connections.
    pub fn inject_remote(&self, event: Event) {
        let mut state = self.state.lock().unwrap();
        if state.stored.insert(event.event_id.clone()) {
            state.log.push(event.clone());
        }
        if state.registered.contains(&event.aggregate_id) {
            for tx in state.connections.values() {
                let _ = tx.send(ServerMessage::event(event.clone()));
            }
        }
    }

    /// Drops every realtime connection, as a server restart would.
    pub fn drop_connections(&self) {
        self.state.lock().unwrap().connections.clear();
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport {
            server: self.clone(),
            conn: None,
        }
    }

    fn issue_tokens(&self, state: &mut ServerState) -> (String, String, DateTime<Utc>) {
        state.next_token += 1;
        let access = format!("access-{}", state.next_token);
        let refresh = format!("refresh-{}", state.next_token);
        let expiry = self.clock.now() + Duration::seconds(state.access_ttl_secs);
        state.access.insert(access.clone(), expiry);
        state.refresh.insert(refresh.clone());
        (access, refresh, expiry)
    }

    fn check_access(&self, state: &ServerState, token: &str) -> std::result::Result<(), ApiError> {
        if state.offline {
            return Err(offline_error());
        }
        match state.access.get(token) {
            Some(expiry) if *expiry > self.clock.now() => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }

    fn store_batch(state: &mut ServerState, events: &[Event]) -> Vec<EventResult> {
        events
            .iter()
            .map(|event| {
                if let Some(remaining) = state.reject.get_mut(&event.event_id) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return EventResult::rejected(event.event_id.clone(), "schema violation");
                    }
                }
                if state.stored.insert(event.event_id.clone()) {
                    state.log.push(event.clone());
                    EventResult::accepted(event.event_id.clone())
                } else {
                    EventResult {
                        event_id: event.event_id.clone(),
                        status: EventStatus::Duplicate,
                        error: None,
                    }
                }
            })
            .collect()
    }

    fn handle_ws(&self, conn: u64, msg: ClientMessage) {
        let mut state = self.state.lock().unwrap();
        state.ws_received.push(msg.clone());
        let reply = match msg {
            ClientMessage::Publish { batch_id, events } => {
                let results = Self::store_batch(&mut state, &events);
                Some(ServerMessage::published(batch_id, results))
            }
            ClientMessage::Register { aggregate_ids } => {
                state.registered.extend(aggregate_ids);
                let mut all: Vec<String> = state.registered.iter().cloned().collect();
                all.sort();
                Some(ServerMessage::registered(all))
            }
            ClientMessage::Ping { id } if state.answer_pings => Some(ServerMessage::pong(id)),
            ClientMessage::Ping { .. } | ClientMessage::Ack { .. } => None,
        };
        if let (Some(reply), Some(tx)) = (reply, state.connections.get(&conn)) {
            let _ = tx.send(reply);
        }
    }
}

fn offline_error() -> ApiError {
    ApiError::Transport(TransportError::ConnectionFailed("connection refused".into()))
}

fn ready<T: Send + 'static>(
    result: std::result::Result<T, ApiError>,
) -> ApiFuture<'static, T> {
    Box::pin(async move { result })
}

impl Api for MockServer {
    fn token(&self, _server_url: &str, request: TokenRequest) -> ApiFuture<'_, TokenResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.token += 1;
        if state.offline {
            return ready(Err(offline_error()));
        }
        if let Some(status) = state.token_status {
            return ready(Err(ApiError::Status {
                status,
                message: "not found".into(),
            }));
        }
        if state.users.get(&request.username) != Some(&request.password) {
            return ready(Err(ApiError::Unauthorized));
        }
        let (access_token, refresh_token, expiry) = self.issue_tokens(&mut state);
        ready(Ok(TokenResponse {
            access_token,
            refresh_token,
            expiry,
        }))
    }

    fn refresh(
        &self,
        _server_url: &str,
        request: RefreshRequest,
    ) -> ApiFuture<'_, RefreshResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.refresh += 1;
        if state.offline {
            return ready(Err(offline_error()));
        }
        if !state.refresh.contains(&request.refresh_token) {
            return ready(Err(ApiError::Unauthorized));
        }
        let (access_token, refresh_token, expiry) = self.issue_tokens(&mut state);
        let refresh_token = if state.rotate_refresh {
            state.refresh.remove(&request.refresh_token);
            Some(refresh_token)
        } else {
            state.refresh.remove(&refresh_token);
            None
        };
        let response = Ok(RefreshResponse {
            access_token,
            expiry,
            refresh_token,
        });
        match state.refresh_delay {
            Some(delay) => Box::pin(async move {
                tokio::time::sleep(delay).await;
                response
            }),
            None => ready(response),
        }
    }

    fn ws_token(&self, _server_url: &str, access_token: &str) -> ApiFuture<'_, WsTokenResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.ws_token += 1;
        if let Err(e) = self.check_access(&state, access_token) {
            return ready(Err(e));
        }
        state.next_token += 1;
        let token = format!("ws-{}", state.next_token);
        state.ws_tokens.insert(token.clone());
        ready(Ok(WsTokenResponse {
            token,
            expiry: self.clock.now() + Duration::seconds(60),
        }))
    }

    fn upload_batch(
        &self,
        _server_url: &str,
        access_token: &str,
        batch: BatchRequest,
    ) -> ApiFuture<'_, BatchResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.batch += 1;
        if let Err(e) = self.check_access(&state, access_token) {
            return ready(Err(e));
        }
        if state.fail_batches > 0 {
            state.fail_batches -= 1;
            return ready(Err(ApiError::Status {
                status: 503,
                message: "unavailable".into(),
            }));
        }
        let results = Self::store_batch(&mut state, &batch.events);
        ready(Ok(BatchResponse { results }))
    }

    fn pull(
        &self,
        _server_url: &str,
        access_token: &str,
        cursor: u64,
        limit: usize,
    ) -> ApiFuture<'_, PullResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.pull += 1;
        if let Err(e) = self.check_access(&state, access_token) {
            return ready(Err(e));
        }
        if state.stall_pull {
            return ready(Ok(PullResponse {
                events: state.log.clone(),
                cursor,
                has_more: true,
            }));
        }
        let start = (cursor as usize).min(state.log.len());
        let end = (start + limit).min(state.log.len());
        ready(Ok(PullResponse {
            events: state.log[start..end].to_vec(),
            cursor: end as u64,
            has_more: end < state.log.len(),
        }))
    }
}

/// Realtime connection to a [`MockServer`].
pub struct MockTransport {
    server: MockServer,
    conn: Option<(u64, mpsc::UnboundedReceiver<ServerMessage>)>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

impl Transport for MockTransport {
    fn connect(&mut self, url: &str) -> BoxFuture<'_, TransportResult<()>> {
        let token = url.split("token=").nth(1).unwrap_or_default().to_string();
        Box::pin(async move {
            let mut state = self.server.state.lock().unwrap();
            if state.offline {
                return Err(TransportError::ConnectionFailed("connection refused".into()));
            }
            if !state.ws_tokens.remove(&token) {
                return Err(TransportError::ConnectionFailed("401 unauthorized".into()));
            }
            state.next_conn += 1;
            let id = state.next_conn;
            let (tx, rx) = mpsc::unbounded_channel();
            state.connections.insert(id, tx);
            drop(state);
            self.conn = Some((id, rx));
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if let Some((id, _)) = self.conn.take() {
                self.server.state.lock().unwrap().connections.remove(&id);
            }
            Ok(())
        })
    }

    fn send(&mut self, msg: ClientMessage) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            let id = match &self.conn {
                Some((id, _)) => *id,
                None => return Err(TransportError::ConnectionClosed),
            };
            if !self.server.state.lock().unwrap().connections.contains_key(&id) {
                self.conn = None;
                return Err(TransportError::SendFailed("broken pipe".into()));
            }
            self.server.handle_ws(id, msg);
            Ok(())
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, TransportResult<Option<ServerMessage>>> {
        Box::pin(async move {
            let Some((_, rx)) = self.conn.as_mut() else {
                return Err(TransportError::ConnectionClosed);
            };
            match rx.recv().await {
                Some(msg) => Ok(Some(msg)),
                None => {
                    self.conn = None;
                    Ok(None)
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

/// An auth manager wired to a fake server, not logged in.
pub fn auth_manager(server: &MockServer, clock: &Arc<MockClock>) -> Arc<AuthManager<MockServer>> {
    Arc::new(
        AuthManager::new(
            Arc::new(server.clone()),
            Arc::new(MemoryCredentialStore::default()),
            clock.clone(),
        )
        .unwrap(),
    )
}

/// An auth manager already logged in as [`USERNAME`].
pub async fn logged_in(
    server: &MockServer,
    clock: &Arc<MockClock>,
) -> Arc<AuthManager<MockServer>> {
    let auth = auth_manager(server, clock);
    auth.login(USERNAME, PASSWORD, SERVER_URL, false)
        .await
        .unwrap();
    auth
}

/// An event created on another node.
pub fn remote_event(aggregate_id: &str, lamport: u64, node: &str) -> Event {
    Event::new(
        EventType::WorkPackageUpdated,
        aggregate_id,
        lamport,
        node,
        serde_json::json!({ "title": format!("{node}@{lamport}") }),
    )
}

/// Polls `cond` until it holds, failing the test after five seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}
