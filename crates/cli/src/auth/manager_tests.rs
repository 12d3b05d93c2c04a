// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::error::Error;
use crate::test_helpers::{
    auth_manager, logged_in, MemoryCredentialStore, MockClock, MockServer, PASSWORD, SERVER_URL,
    USERNAME,
};
use yare::parameterized;

#[parameterized(
    login = { AuthState::Unauthenticated, AuthState::Authenticated, true },
    expire = { AuthState::Authenticated, AuthState::Expired, true },
    begin_refresh = { AuthState::Expired, AuthState::Refreshing, true },
    refreshed = { AuthState::Refreshing, AuthState::Authenticated, true },
    refresh_network_error = { AuthState::Refreshing, AuthState::Expired, true },
    logout_from_refreshing = { AuthState::Refreshing, AuthState::Unauthenticated, true },
    skip_refresh = { AuthState::Expired, AuthState::Authenticated, false },
    refresh_without_session = { AuthState::Unauthenticated, AuthState::Refreshing, false },
    authenticated_refreshing = { AuthState::Authenticated, AuthState::Refreshing, false },
)]
fn transitions(from: AuthState, to: AuthState, allowed: bool) {
    assert_eq!(from.allows(to), allowed);
}

#[test]
fn invalid_transition_is_an_error() {
    let mut inner = Inner {
        state: AuthState::Unauthenticated,
        session: None,
        generation: 0,
    };
    let err = inner.transition(AuthState::Refreshing).unwrap_err();
    assert!(matches!(err, AuthError::InvalidTransition { .. }));
    assert_eq!(inner.state, AuthState::Unauthenticated);
}

#[tokio::test]
async fn login_persists_session() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let store = Arc::new(MemoryCredentialStore::default());
    let auth = AuthManager::new(Arc::new(server.clone()), store.clone(), clock.clone()).unwrap();

    let status = auth
        .login(USERNAME, PASSWORD, "https://sync.test/", false)
        .await
        .unwrap();

    assert_eq!(status.state, AuthState::Authenticated);
    assert_eq!(status.username.as_deref(), Some(USERNAME));
    assert_eq!(status.server_url.as_deref(), Some(SERVER_URL));
    assert_eq!(store.load().unwrap().unwrap().username, USERNAME);
}

#[tokio::test]
async fn wrong_password_persists_nothing() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let store = Arc::new(MemoryCredentialStore::default());
    let auth = AuthManager::new(Arc::new(server), store.clone(), clock).unwrap();

    let err = auth
        .login(USERNAME, "hunter2", SERVER_URL, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
    assert!(store.load().unwrap().is_none());
    assert_eq!(auth.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn login_refused_for_other_reasons_is_server_error() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    server.set_token_status(404);
    let store = Arc::new(MemoryCredentialStore::default());
    let auth = AuthManager::new(Arc::new(server), store.clone(), clock).unwrap();

    let err = auth
        .login(USERNAME, PASSWORD, SERVER_URL, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Server(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn login_while_offline_is_network_unavailable() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    server.set_offline(true);
    let auth = auth_manager(&server, &clock);

    let err = auth
        .login(USERNAME, PASSWORD, SERVER_URL, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::NetworkUnavailable(_))));
}

#[tokio::test]
async fn second_login_requires_force() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = logged_in(&server, &clock).await;

    let err = auth
        .login(USERNAME, PASSWORD, SERVER_URL, false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::AlreadyAuthenticated { .. })
    ));
    // Rejected before reaching the server
    assert_eq!(server.calls().token, 1);

    auth.login(USERNAME, PASSWORD, SERVER_URL, true)
        .await
        .unwrap();
    assert_eq!(server.calls().token, 2);
}

#[tokio::test]
async fn invalid_server_url_is_rejected() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = auth_manager(&server, &clock);

    let err = auth
        .login(USERNAME, PASSWORD, "ftp://sync.test", false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(server.calls().token, 0);
}

#[tokio::test]
async fn status_reports_expiry_without_refreshing() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = logged_in(&server, &clock).await;

    clock.advance(Duration::hours(2));

    assert_eq!(auth.status().state, AuthState::Expired);
    assert_eq!(auth.status().state, AuthState::Expired);
    assert_eq!(server.calls().refresh, 0);
}

#[tokio::test]
async fn ensure_valid_keeps_fresh_token() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = logged_in(&server, &clock).await;
    let before = auth.session().unwrap();

    let session = auth.ensure_valid().await.unwrap();

    assert_eq!(session.access_token, before.access_token);
    assert_eq!(server.calls().refresh, 0);
}

#[tokio::test]
async fn ensure_valid_refreshes_near_expiry() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = logged_in(&server, &clock).await;
    let before = auth.session().unwrap();

    clock.advance(Duration::seconds(3600 - 10));
    let session = auth.ensure_valid().await.unwrap();

    assert_ne!(session.access_token, before.access_token);
    assert!(session.access_expiry > clock.now());
    assert_eq!(auth.state(), AuthState::Authenticated);
    assert_eq!(server.calls().refresh, 1);
}

#[tokio::test]
async fn rotated_refresh_token_is_persisted() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    server.set_rotate_refresh(true);
    let store = Arc::new(MemoryCredentialStore::default());
    let auth = AuthManager::new(Arc::new(server.clone()), store.clone(), clock.clone()).unwrap();
    auth.login(USERNAME, PASSWORD, SERVER_URL, false)
        .await
        .unwrap();
    let original = store.load().unwrap().unwrap().refresh_token;

    clock.advance(Duration::hours(2));
    auth.ensure_valid().await.unwrap();

    let persisted = store.load().unwrap().unwrap();
    assert_ne!(persisted.refresh_token, original);
    assert_eq!(persisted.access_token, auth.session().unwrap().access_token);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    server.set_rotate_refresh(true);
    let auth = logged_in(&server, &clock).await;
    clock.advance(Duration::hours(2));

    let (a, b, c) = tokio::join!(auth.ensure_valid(), auth.ensure_valid(), auth.ensure_valid());

    let a = a.unwrap();
    assert_eq!(a.access_token, b.unwrap().access_token);
    assert_eq!(a.access_token, c.unwrap().access_token);
    assert_eq!(server.calls().refresh, 1);
}

#[tokio::test]
async fn rejected_refresh_requires_reauth() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let store = Arc::new(MemoryCredentialStore::default());
    let auth = AuthManager::new(Arc::new(server.clone()), store.clone(), clock.clone()).unwrap();
    auth.login(USERNAME, PASSWORD, SERVER_URL, false)
        .await
        .unwrap();
    server.revoke_refresh_tokens();
    clock.advance(Duration::hours(2));

    let err = auth.ensure_valid().await.unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::ReauthRequired)));
    assert_eq!(auth.state(), AuthState::Unauthenticated);
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn logout_during_refresh_stays_logged_out() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let store = Arc::new(MemoryCredentialStore::default());
    let auth = AuthManager::new(Arc::new(server.clone()), store.clone(), clock.clone()).unwrap();
    auth.login(USERNAME, PASSWORD, SERVER_URL, false)
        .await
        .unwrap();
    server.set_refresh_delay(std::time::Duration::from_millis(50));
    clock.advance(Duration::hours(2));

    let (refreshed, logged_out) = tokio::join!(auth.ensure_valid(), async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        auth.logout()
    });

    assert!(logged_out.unwrap());
    assert!(matches!(
        refreshed.unwrap_err(),
        Error::Auth(AuthError::NotLoggedIn)
    ));
    assert_eq!(server.calls().refresh, 1);
    assert_eq!(auth.state(), AuthState::Unauthenticated);
    assert!(auth.session().is_none());
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn forced_login_during_refresh_keeps_new_session() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let store = Arc::new(MemoryCredentialStore::default());
    let auth = AuthManager::new(Arc::new(server.clone()), store.clone(), clock.clone()).unwrap();
    auth.login(USERNAME, PASSWORD, SERVER_URL, false)
        .await
        .unwrap();
    server.set_refresh_delay(std::time::Duration::from_millis(50));
    clock.advance(Duration::hours(2));

    let (refreshed, relogin) = tokio::join!(auth.ensure_valid(), async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        auth.login(USERNAME, PASSWORD, SERVER_URL, true).await
    });

    assert_eq!(relogin.unwrap().state, AuthState::Authenticated);
    let current = auth.session().unwrap();
    assert_eq!(refreshed.unwrap().access_token, current.access_token);
    assert_eq!(store.load().unwrap().unwrap().access_token, current.access_token);
    assert_eq!(auth.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn refresh_network_error_keeps_session() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = logged_in(&server, &clock).await;
    clock.advance(Duration::hours(2));
    server.set_offline(true);

    let err = auth.ensure_valid().await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::NetworkUnavailable(_))));
    assert_eq!(auth.state(), AuthState::Expired);
    assert!(auth.session().is_some());

    server.set_offline(false);
    auth.ensure_valid().await.unwrap();
    assert_eq!(auth.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn authorized_retries_once_after_server_rejects_token() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = logged_in(&server, &clock).await;
    server.revoke_access_tokens();

    let api = Arc::clone(auth.api());
    let outcome = auth
        .authorized(|session| {
            let api = Arc::clone(&api);
            async move { api.pull(&session.server_url, &session.access_token, 0, 10).await }
        })
        .await
        .unwrap();

    assert!(outcome.is_ok());
    assert_eq!(server.calls().pull, 2);
    assert_eq!(server.calls().refresh, 1);
}

#[tokio::test]
async fn authorized_ends_session_after_second_rejection() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = logged_in(&server, &clock).await;

    let err = auth
        .authorized(|_session| async { Err::<(), _>(ApiError::Unauthorized) })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::ReauthRequired)));
    assert_eq!(auth.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn authorized_passes_other_errors_through() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = logged_in(&server, &clock).await;

    let outcome = auth
        .authorized(|_session| async {
            Err::<(), _>(ApiError::Status {
                status: 503,
                message: "busy".into(),
            })
        })
        .await
        .unwrap();

    assert!(outcome.unwrap_err().is_transient());
    assert_eq!(auth.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn ws_token_carries_server_url() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = logged_in(&server, &clock).await;

    let token = auth.exchange_ws_token().await.unwrap();

    assert!(token.token.starts_with("ws-"));
    assert_eq!(token.server_url, SERVER_URL);
    assert!(!format!("{token:?}").contains(&token.token));
}

#[tokio::test]
async fn ws_token_requires_login() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = auth_manager(&server, &clock);

    let err = auth.exchange_ws_token().await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::NotLoggedIn)));
}

#[tokio::test]
async fn logout_is_idempotent() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let auth = logged_in(&server, &clock).await;

    assert!(auth.logout().unwrap());
    assert!(!auth.logout().unwrap());
    assert_eq!(auth.status().username, None);
    assert_eq!(auth.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn persisted_session_is_loaded() {
    let clock = MockClock::new();
    let server = MockServer::new(clock.clone());
    let store = Arc::new(MemoryCredentialStore::default());
    let first = AuthManager::new(Arc::new(server.clone()), store.clone(), clock.clone()).unwrap();
    first
        .login(USERNAME, PASSWORD, SERVER_URL, false)
        .await
        .unwrap();

    let second = AuthManager::new(Arc::new(server), store, clock).unwrap();
    assert_eq!(second.state(), AuthState::Authenticated);
}
