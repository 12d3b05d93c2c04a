// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! [`Api`] over HTTPS with reqwest.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use tandem_core::protocol::{
    BatchRequest, BatchResponse, PullResponse, RefreshRequest, RefreshResponse, TokenRequest,
    TokenResponse, WsTokenResponse,
};

use super::{Api, ApiError, ApiFuture};
use crate::error::{Error, Result};
use crate::sync::TransportError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Production [`Api`] implementation.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
}

impl HttpApi {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tandem/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpApi { client })
    }
}

fn endpoint(server_url: &str, path: &str) -> String {
    format!("{}{}", server_url.trim_end_matches('/'), path)
}

/// Sends a request and decodes a JSON success body.
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> std::result::Result<T, ApiError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else {
            TransportError::ConnectionFailed(e.to_string())
        }
    })?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| TransportError::SerializationError(e.to_string()).into())
}

impl Api for HttpApi {
    fn token(&self, server_url: &str, request: TokenRequest) -> ApiFuture<'_, TokenResponse> {
        let url = endpoint(server_url, "/api/v1/auth/token");
        Box::pin(async move { send_json(self.client.post(url).json(&request)).await })
    }

    fn refresh(
        &self,
        server_url: &str,
        request: RefreshRequest,
    ) -> ApiFuture<'_, RefreshResponse> {
        let url = endpoint(server_url, "/api/v1/auth/refresh");
        Box::pin(async move { send_json(self.client.post(url).json(&request)).await })
    }

    fn ws_token(&self, server_url: &str, access_token: &str) -> ApiFuture<'_, WsTokenResponse> {
        let url = endpoint(server_url, "/api/v1/auth/ws-token");
        let token = access_token.to_string();
        Box::pin(async move { send_json(self.client.post(url).bearer_auth(token)).await })
    }

    fn upload_batch(
        &self,
        server_url: &str,
        access_token: &str,
        batch: BatchRequest,
    ) -> ApiFuture<'_, BatchResponse> {
        let url = endpoint(server_url, "/api/v1/events/batch");
        let token = access_token.to_string();
        Box::pin(async move {
            send_json(self.client.post(url).bearer_auth(token).json(&batch)).await
        })
    }

    fn pull(
        &self,
        server_url: &str,
        access_token: &str,
        cursor: u64,
        limit: usize,
    ) -> ApiFuture<'_, PullResponse> {
        let url = endpoint(server_url, "/api/v1/events");
        let token = access_token.to_string();
        Box::pin(async move {
            let request = self
                .client
                .get(url)
                .bearer_auth(token)
                .query(&[("cursor", cursor.to_string()), ("limit", limit.to_string())]);
            send_json(request).await
        })
    }
}
