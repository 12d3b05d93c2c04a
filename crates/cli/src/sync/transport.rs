// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for the realtime event stream.
//!
//! The realtime channel only talks to a [`Transport`]; production uses
//! [`WebSocketTransport`], tests use an in-process fake.

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use tandem_core::protocol::{ClientMessage, ServerMessage};

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// No response in time.
    #[error("timed out: {0}")]
    Timeout(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A bidirectional message stream to the sync server.
///
/// `recv` must be cancel-safe: the channel races it against timers and
/// drops the future when another branch wins.
pub trait Transport: Send + Sync {
    /// Connect to the stream URL (token already in the query string).
    fn connect(
        &mut self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Disconnect from the server.
    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Send a message to the server.
    fn send(
        &mut self,
        msg: ClientMessage,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Receive a message from the server.
    ///
    /// Returns `None` if the connection is closed.
    fn recv(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Option<ServerMessage>>> + Send + '_>>;

    /// Check if connected.
    fn is_connected(&self) -> bool;
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// [`Transport`] over a WebSocket, JSON text frames.
#[derive(Default)]
pub struct WebSocketTransport {
    sink: Option<SplitSink<WsStream, Message>>,
    stream: Option<SplitStream<WsStream>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn drop_connection(&mut self) {
        self.sink = None;
        self.stream = None;
    }
}

impl Transport for WebSocketTransport {
    fn connect(
        &mut self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            let (sink, stream) = ws.split();
            self.sink = Some(sink);
            self.stream = Some(stream);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if let Some(mut sink) = self.sink.take() {
                // Best effort; the peer may already be gone
                let _ = sink.close().await;
            }
            self.stream = None;
            Ok(())
        })
    }

    fn send(
        &mut self,
        msg: ClientMessage,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            let json = msg
                .to_json()
                .map_err(|e| TransportError::SerializationError(e.to_string()))?;
            let sink = self.sink.as_mut().ok_or(TransportError::ConnectionClosed)?;

            // send() flushes, so a dead socket is detected here
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                self.drop_connection();
                return Err(TransportError::SendFailed(e.to_string()));
            }
            Ok(())
        })
    }

    fn recv(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Option<ServerMessage>>> + Send + '_>> {
        Box::pin(async move {
            let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return ServerMessage::from_json(&text)
                            .map(Some)
                            .map_err(|e| TransportError::SerializationError(e.to_string()));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        self.drop_connection();
                        return Ok(None);
                    }
                    // Control and binary frames carry nothing for us
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        self.drop_connection();
                        return Err(TransportError::ReceiveFailed(e.to_string()));
                    }
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.sink.is_some()
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
