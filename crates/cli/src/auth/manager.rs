// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Auth session state machine.
//!
//! ```text
//!                    login
//! Unauthenticated ──────────► Authenticated ──clock passes expiry──► Expired
//!       ▲                          ▲                                   │
//!       │                          │ refresh ok                        │ ensure_valid
//!       │   refresh rejected       │                                   ▼
//!       └───────────────────── Refreshing ◄────────────────────────────┘
//!                                  │ network error: back to Expired
//! ```
//!
//! Logout moves any state to `Unauthenticated`. Transitions are checked;
//! an illegal one is an error, never a silent overwrite.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tandem_core::protocol::{RefreshRequest, TokenRequest};
use tandem_core::ClockSource;

use super::credentials::{CredentialStore, Session};
use crate::api::{Api, ApiError};
use crate::config::validate_server_url;
use crate::error::{AuthError, Error, Result};

/// Tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 30;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    /// The access token has expired and no refresh was attempted yet.
    Expired,
    Refreshing,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticated => "authenticated",
            AuthState::Expired => "expired",
            AuthState::Refreshing => "refreshing",
        }
    }

    /// Returns true if the machine may move from `self` to `to`.
    pub fn allows(self, to: AuthState) -> bool {
        use AuthState::*;
        matches!(
            (self, to),
            (_, Unauthenticated)
                | (Unauthenticated, Authenticated)
                | (Authenticated, Expired)
                | (Expired, Refreshing)
                | (Refreshing, Authenticated)
                | (Refreshing, Expired)
        )
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by [`AuthManager::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub state: AuthState,
    pub username: Option<String>,
    pub server_url: Option<String>,
    pub access_expiry: Option<DateTime<Utc>>,
}

/// Short-lived token for one realtime connection. Never persisted.
#[derive(Clone)]
pub struct WsToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
    pub server_url: String,
}

impl fmt::Debug for WsToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsToken")
            .field("token", &"<redacted>")
            .field("expiry", &self.expiry)
            .field("server_url", &self.server_url)
            .finish()
    }
}

struct Inner {
    state: AuthState,
    session: Option<Session>,
    /// Bumped whenever the session is replaced or removed, so a refresh
    /// that started on an older session cannot write its result back.
    generation: u64,
}

impl Inner {
    fn transition(&mut self, to: AuthState) -> std::result::Result<(), AuthError> {
        if !self.state.allows(to) {
            return Err(AuthError::InvalidTransition {
                from: self.state.as_str(),
                to: to.as_str(),
            });
        }
        if self.state != to {
            tracing::debug!(from = %self.state, to = %to, "auth transition");
        }
        self.state = to;
        Ok(())
    }
}

/// Owns the session and every change to it.
pub struct AuthManager<A> {
    api: Arc<A>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn ClockSource>,
    inner: Mutex<Inner>,
    /// Serializes refreshes so concurrent callers share one round trip.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl<A: Api> AuthManager<A> {
    /// Creates a manager, loading any persisted session.
    pub fn new(
        api: Arc<A>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn ClockSource>,
    ) -> Result<Self> {
        let session = store.load()?;
        let state = if session.is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        Ok(AuthManager {
            api,
            store,
            clock,
            inner: Mutex::new(Inner {
                state,
                session,
                generation: 0,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, with expiry judged against the clock.
    pub fn state(&self) -> AuthState {
        self.status().state
    }

    /// Session validity, expiry and server. Has no side effects.
    pub fn status(&self) -> AuthStatus {
        let inner = self.lock();
        let now = self.clock.now();
        let state = match (&inner.session, inner.state) {
            (Some(session), AuthState::Authenticated) if session.is_expired(now) => {
                AuthState::Expired
            }
            (_, state) => state,
        };
        AuthStatus {
            state,
            username: inner.session.as_ref().map(|s| s.username.clone()),
            server_url: inner.session.as_ref().map(|s| s.server_url.clone()),
            access_expiry: inner.session.as_ref().map(|s| s.access_expiry),
        }
    }

    /// Snapshot of the current session, if any.
    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    /// Exchanges credentials for a token pair and persists the session.
    ///
    /// An existing session is only replaced when `force` is set; that check
    /// happens before any network traffic.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        server_url: &str,
        force: bool,
    ) -> Result<AuthStatus> {
        let server_url = validate_server_url(server_url)?;
        if !force {
            if let Some(existing) = self.lock().session.as_ref() {
                return Err(AuthError::AlreadyAuthenticated {
                    username: existing.username.clone(),
                    server_url: existing.server_url.clone(),
                }
                .into());
            }
        }

        let request = TokenRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = match self.api.token(&server_url, request).await {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                return Err(AuthError::NetworkUnavailable(e.to_string()).into())
            }
            Err(ApiError::Unauthorized) => {
                tracing::debug!("login rejected");
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(Error::Server(e.to_string())),
        };

        let session = Session {
            username: username.to_string(),
            server_url,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            access_expiry: response.expiry,
        };
        {
            let mut inner = self.lock();
            self.store.save(&session)?;
            inner.transition(AuthState::Unauthenticated)?;
            inner.transition(AuthState::Authenticated)?;
            inner.session = Some(session);
            inner.generation += 1;
        }
        tracing::info!(username = %username, "logged in");
        Ok(self.status())
    }

    /// Deletes the persisted session. Returns true if there was one.
    pub fn logout(&self) -> Result<bool> {
        let mut inner = self.lock();
        let existed = self.store.clear()?;
        let had_session = inner.session.take().is_some();
        inner.generation += 1;
        inner.transition(AuthState::Unauthenticated)?;
        if existed || had_session {
            tracing::info!("logged out");
        }
        Ok(existed || had_session)
    }

    /// Returns a session whose access token is usable now, refreshing it
    /// silently if needed.
    ///
    /// A rejected refresh ends the session (`ReauthRequired`). A refresh that
    /// fails on the network keeps it for the next attempt.
    pub async fn ensure_valid(&self) -> Result<Session> {
        let _flight = self.refresh_lock.lock().await;

        let (session, generation) = {
            let inner = self.lock();
            let session = inner.session.clone().ok_or(AuthError::NotLoggedIn)?;
            (session, inner.generation)
        };
        let deadline = self.clock.now() + Duration::seconds(REFRESH_MARGIN_SECS);
        if !session.is_expired(deadline) {
            return Ok(session);
        }

        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return superseded(&inner);
            }
            if inner.state == AuthState::Authenticated {
                inner.transition(AuthState::Expired)?;
            }
            inner.transition(AuthState::Refreshing)?;
        }

        let request = RefreshRequest {
            refresh_token: session.refresh_token.clone(),
        };
        let outcome = self.api.refresh(&session.server_url, request).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!("session replaced during refresh, discarding result");
            return superseded(&inner);
        }
        match outcome {
            Ok(response) => {
                let mut refreshed = session;
                refreshed.access_token = response.access_token;
                refreshed.access_expiry = response.expiry;
                if let Some(rotated) = response.refresh_token {
                    refreshed.refresh_token = rotated;
                }
                if let Err(e) = self.store.save(&refreshed) {
                    inner.transition(AuthState::Expired)?;
                    return Err(e);
                }
                inner.transition(AuthState::Authenticated)?;
                inner.session = Some(refreshed.clone());
                tracing::info!("refreshed access token");
                Ok(refreshed)
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "token refresh failed, will retry");
                inner.transition(AuthState::Expired)?;
                Err(AuthError::NetworkUnavailable(e.to_string()).into())
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh rejected");
                self.end_session_locked(&mut inner)?;
                Err(AuthError::ReauthRequired.into())
            }
        }
    }

    /// Runs an authenticated API call.
    ///
    /// If the server rejects the access token, the token is refreshed and
    /// the call repeated once; a second rejection ends the session. The
    /// outer result carries auth failures, the inner one every other API
    /// error for the caller to classify.
    pub async fn authorized<T, F, Fut>(&self, mut call: F) -> Result<std::result::Result<T, ApiError>>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        let session = self.ensure_valid().await?;
        match call(session).await {
            Err(ApiError::Unauthorized) => {}
            other => return Ok(other),
        }

        tracing::debug!("access token rejected, refreshing");
        self.reject_access_token();
        let session = self.ensure_valid().await?;
        match call(session).await {
            Err(ApiError::Unauthorized) => {
                self.end_session()?;
                Err(AuthError::ReauthRequired.into())
            }
            other => Ok(other),
        }
    }

    /// Obtains a short-lived token for the realtime stream.
    pub async fn exchange_ws_token(&self) -> Result<WsToken> {
        let api = Arc::clone(&self.api);
        let mut server_url = String::new();
        let outcome = self
            .authorized(|session| {
                server_url = session.server_url.clone();
                let api = Arc::clone(&api);
                async move {
                    api.ws_token(&session.server_url, &session.access_token)
                        .await
                }
            })
            .await?;
        match outcome {
            Ok(response) => Ok(WsToken {
                token: response.token,
                expiry: response.expiry,
                server_url,
            }),
            Err(e) => Err(AuthError::NetworkUnavailable(e.to_string()).into()),
        }
    }

    /// Treats the in-memory access token as expired so the next
    /// [`ensure_valid`](Self::ensure_valid) refreshes it.
    fn reject_access_token(&self) {
        let now = self.clock.now();
        if let Some(session) = self.lock().session.as_mut() {
            session.access_expiry = now;
        }
    }

    fn end_session(&self) -> Result<()> {
        let mut inner = self.lock();
        self.end_session_locked(&mut inner)
    }

    fn end_session_locked(&self, inner: &mut Inner) -> Result<()> {
        self.store.clear()?;
        inner.session = None;
        inner.generation += 1;
        inner.transition(AuthState::Unauthenticated)?;
        Ok(())
    }
}

/// The session a caller should use after its own was replaced or removed
/// while it waited.
fn superseded(inner: &Inner) -> Result<Session> {
    inner
        .session
        .clone()
        .ok_or_else(|| AuthError::NotLoggedIn.into())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
