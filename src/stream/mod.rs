//! # Stream Module
//!
//! Lifecycle of the single logical connection to the station backend.
//!
//! This module handles:
//! - Connection state tracking (disconnected, connecting, connected, reconnecting)
//! - Decoding inbound frames and answering keepalives
//! - Fixed-interval reconnect scheduling after every close
//! - User-initiated disconnects that stay disconnected
//!
//! [`StreamClient`] performs no I/O. Each operation returns the effects the
//! caller must carry out (open/close the transport, send a frame, arm/cancel
//! the reconnect timer) and the signals the coordinator reacts to.

pub mod protocol;
pub mod transport;

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use protocol::{decode_message, InboundMessage, OutboundMessage};

/// Default delay before a reconnect attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);

/// State of the backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and no attempt in flight
    Disconnected,
    /// First or user-requested attempt in flight
    Connecting,
    /// Open and authoritative
    Connected,
    /// Timer-driven attempt in flight
    Reconnecting,
}

impl ConnectionState {
    fn attempt_in_flight(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// What the client tells the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientSignal {
    /// Connection state changed
    StateChanged(ConnectionState),
    /// The connection opened; the live stream is authoritative
    Connected,
    /// The connection closed unexpectedly; a reconnect is scheduled
    Closed,
    /// The transport reported an error (a close follows)
    TransportError(String),
    /// A decoded frame for the coordinator
    Message(InboundMessage),
}

/// Work the caller must perform on behalf of the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEffect {
    /// Start a connection attempt
    OpenTransport,
    /// Close the connection
    CloseTransport,
    /// Send a control frame
    Send(OutboundMessage),
    /// Arm the reconnect timer, replacing any pending one
    ArmReconnect(Duration),
    /// Cancel the pending reconnect timer
    CancelReconnect,
    /// Forward to the coordinator
    Signal(ClientSignal),
}

/// Connection lifecycle state machine.
///
/// # Examples
///
/// ```
/// use wattscope_link::stream::{ClientEffect, ConnectionState, StreamClient, DEFAULT_RECONNECT_INTERVAL};
///
/// let mut client = StreamClient::new(DEFAULT_RECONNECT_INTERVAL);
/// let effects = client.connect();
/// assert!(effects.contains(&ClientEffect::OpenTransport));
/// assert_eq!(client.state(), ConnectionState::Connecting);
/// ```
#[derive(Debug)]
pub struct StreamClient {
    state: ConnectionState,
    reconnect_interval: Duration,
    reconnect_pending: bool,
}

impl StreamClient {
    /// Create a disconnected client.
    pub fn new(reconnect_interval: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_interval,
            reconnect_pending: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether a reconnect attempt is scheduled.
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    /// Start a connection attempt now.
    ///
    /// Cancels a pending reconnect. No-op while connected or while an attempt
    /// is already in flight.
    pub fn connect(&mut self) -> Vec<ClientEffect> {
        if self.state != ConnectionState::Disconnected {
            debug!("connect() ignored while {}", self.state);
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.cancel_reconnect(&mut effects);
        info!("Connecting to backend");
        self.set_state(ConnectionState::Connecting, &mut effects);
        effects.push(ClientEffect::OpenTransport);
        effects
    }

    /// Reconnect now instead of waiting for the timer.
    ///
    /// No-op while connected.
    pub fn force_reconnect(&mut self) -> Vec<ClientEffect> {
        if self.is_connected() {
            debug!("Already connected, reconnect request ignored");
            return Vec::new();
        }
        self.connect()
    }

    /// The transport finished opening.
    pub fn on_open(&mut self) -> Vec<ClientEffect> {
        let mut effects = Vec::new();

        if !self.state.attempt_in_flight() {
            // Opened after the user gave up on it
            debug!("Connection opened while {}, closing it", self.state);
            effects.push(ClientEffect::CloseTransport);
            return effects;
        }

        self.cancel_reconnect(&mut effects);
        self.set_state(ConnectionState::Connected, &mut effects);
        effects.push(ClientEffect::Signal(ClientSignal::Connected));
        effects
    }

    /// A connection attempt failed before opening.
    pub fn on_open_failed(&mut self, reason: &str) -> Vec<ClientEffect> {
        let mut effects = self.on_error(reason);
        effects.extend(self.on_closed());
        effects
    }

    /// An inbound text frame arrived.
    ///
    /// Malformed frames are logged and dropped; the connection stays up.
    pub fn on_message(&mut self, text: &str) -> Vec<ClientEffect> {
        if self.state != ConnectionState::Connected {
            debug!("Dropping frame received while {}", self.state);
            return Vec::new();
        }

        match decode_message(text) {
            Ok(InboundMessage::Keepalive) => {
                debug!("Keepalive received, replying with ping");
                vec![ClientEffect::Send(OutboundMessage::Ping)]
            }
            Ok(message) => vec![ClientEffect::Signal(ClientSignal::Message(message))],
            Err(e) => {
                warn!("Ignoring malformed frame: {}", e);
                Vec::new()
            }
        }
    }

    /// The transport reported an error. The connection is left for the close
    /// event to tear down.
    pub fn on_error(&mut self, reason: &str) -> Vec<ClientEffect> {
        warn!("Transport error while {}: {}", self.state, reason);
        vec![ClientEffect::Signal(ClientSignal::TransportError(reason.to_string()))]
    }

    /// The connection closed, gracefully or not, or an attempt failed.
    ///
    /// Schedules exactly one reconnect attempt. No-op when already
    /// disconnected, e.g. after [`StreamClient::disconnect`].
    pub fn on_closed(&mut self) -> Vec<ClientEffect> {
        if self.state == ConnectionState::Disconnected {
            debug!("Close ignored, already disconnected");
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.set_state(ConnectionState::Disconnected, &mut effects);
        effects.push(ClientEffect::Signal(ClientSignal::Closed));
        effects.push(ClientEffect::ArmReconnect(self.reconnect_interval));
        self.reconnect_pending = true;
        info!(
            "Connection closed, reconnecting in {}ms",
            self.reconnect_interval.as_millis()
        );
        effects
    }

    /// The reconnect timer fired.
    pub fn on_reconnect_timer(&mut self) -> Vec<ClientEffect> {
        self.reconnect_pending = false;

        if self.state != ConnectionState::Disconnected {
            debug!("Reconnect timer ignored while {}", self.state);
            return Vec::new();
        }

        let mut effects = Vec::new();
        info!("Attempting to reconnect");
        self.set_state(ConnectionState::Reconnecting, &mut effects);
        effects.push(ClientEffect::OpenTransport);
        effects
    }

    /// User-initiated disconnect: close, cancel pending reconnects, stay down.
    pub fn disconnect(&mut self) -> Vec<ClientEffect> {
        let mut effects = Vec::new();
        self.cancel_reconnect(&mut effects);

        if self.state != ConnectionState::Disconnected {
            info!("Disconnecting from backend");
            effects.push(ClientEffect::CloseTransport);
            self.set_state(ConnectionState::Disconnected, &mut effects);
        }

        effects
    }

    fn set_state(&mut self, state: ConnectionState, effects: &mut Vec<ClientEffect>) {
        if self.state != state {
            debug!("Connection state {} -> {}", self.state, state);
            self.state = state;
            effects.push(ClientEffect::Signal(ClientSignal::StateChanged(state)));
        }
    }

    fn cancel_reconnect(&mut self, effects: &mut Vec<ClientEffect>) {
        if self.reconnect_pending {
            self.reconnect_pending = false;
            effects.push(ClientEffect::CancelReconnect);
        }
    }
}
