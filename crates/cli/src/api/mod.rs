// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! REST client for the sync server.
//!
//! The [`Api`] trait covers every HTTP endpoint the engine calls, so auth,
//! upload and pull logic can be tested against an in-process fake server.

mod http;

use std::future::Future;
use std::pin::Pin;

use tandem_core::protocol::{
    BatchRequest, BatchResponse, PullResponse, RefreshRequest, RefreshResponse, TokenRequest,
    TokenResponse, WsTokenResponse,
};

use crate::sync::TransportError;

pub use http::HttpApi;

/// Error type for API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server refused the credentials or token (401/403).
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-success status.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ApiError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Unauthorized => false,
            ApiError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            ApiError::Transport(_) => true,
        }
    }
}

/// Boxed future returned by [`Api`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// HTTP endpoints of the sync server.
///
/// Every method takes the server base URL explicitly; the session decides
/// which server a request goes to.
pub trait Api: Send + Sync {
    /// `POST /api/v1/auth/token`
    fn token(&self, server_url: &str, request: TokenRequest) -> ApiFuture<'_, TokenResponse>;

    /// `POST /api/v1/auth/refresh`
    fn refresh(&self, server_url: &str, request: RefreshRequest)
        -> ApiFuture<'_, RefreshResponse>;

    /// `POST /api/v1/auth/ws-token`
    fn ws_token(&self, server_url: &str, access_token: &str) -> ApiFuture<'_, WsTokenResponse>;

    /// `POST /api/v1/events/batch`
    fn upload_batch(
        &self,
        server_url: &str,
        access_token: &str,
        batch: BatchRequest,
    ) -> ApiFuture<'_, BatchResponse>;

    /// `GET /api/v1/events?cursor=N&limit=M`
    fn pull(
        &self,
        server_url: &str,
        access_token: &str,
        cursor: u64,
        limit: usize,
    ) -> ApiFuture<'_, PullResponse>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
