//! # Transport
//!
//! Trait abstraction for the backend connection to enable testing.
//!
//! Opening and using a connection are split: a [`Connector`] is shared with
//! the task that performs a connection attempt, and hands back a
//! [`Connection`] that the session owns until it closes. [`WsConnector`] is the
//! production implementation over `tokio-tungstenite`. Tests drive the session
//! with the scripted connector in `mocks`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::{LinkError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Something that happened on an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text payload (binary frames are converted lossily)
    Text(String),
    /// The connection failed; a `Closed` event follows
    Error(String),
    /// The connection is gone, gracefully or not
    Closed,
}

/// Opens connections to the backend
///
/// Attempts run in their own task, so implementations must be shareable.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    /// Perform one connection attempt
    async fn connect(&self) -> Result<Self::Connection>;
}

/// An established connection
#[async_trait]
pub trait Connection: Send + 'static {
    /// Send a text frame
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Wait for the next event
    ///
    /// Must be cancel-safe: the session polls it inside `tokio::select!`.
    async fn next_event(&mut self) -> TransportEvent;

    /// Close the connection if still open
    async fn close(&mut self);

    /// Whether events can still arrive
    fn is_open(&self) -> bool;
}

/// WebSocket connector backed by `tokio-tungstenite`
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector for `url`
    ///
    /// # Arguments
    ///
    /// * `url` - WebSocket endpoint, e.g. `ws://localhost:8000/ws`
    /// * `connect_timeout` - Upper bound on a single connection attempt
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Connection = WsConnection;

    async fn connect(&self) -> Result<WsConnection> {
        debug!("Connecting to {}", self.url);

        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                LinkError::Transport(format!(
                    "Timed out connecting to {} after {}ms",
                    self.url,
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| LinkError::Transport(format!("Failed to connect to {}: {}", self.url, e)))?;

        info!("WebSocket connected to {}", self.url);
        Ok(WsConnection {
            stream: Some(stream),
            failed: false,
        })
    }
}

/// An open WebSocket
pub struct WsConnection {
    stream: Option<WsStream>,
    failed: bool,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("open", &self.stream.is_some())
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| LinkError::Transport("WebSocket not connected".to_string()))?;

        stream
            .send(Message::Text(text))
            .await
            .map_err(|e| LinkError::Transport(format!("Failed to send frame: {}", e)))
    }

    async fn next_event(&mut self) -> TransportEvent {
        if self.failed {
            self.failed = false;
            self.stream = None;
            return TransportEvent::Closed;
        }

        let Some(stream) = self.stream.as_mut() else {
            return TransportEvent::Closed;
        };

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text),
                Some(Ok(Message::Binary(bytes))) => {
                    return TransportEvent::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Close frame received: {:?}", frame);
                    self.stream = None;
                    return TransportEvent::Closed;
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.failed = true;
                    return TransportEvent::Error(e.to_string());
                }
                None => {
                    self.stream = None;
                    return TransportEvent::Closed;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!("Error while closing WebSocket: {}", e);
            }
        }
        self.failed = false;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
