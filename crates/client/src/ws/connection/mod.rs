//! Connection state, reconnect policy and the transport seam.
//!
//! This module provides the shared types and conditionally includes
//! the platform-specific transport.

use std::fmt;
use std::time::Duration;

use counselflow_shared::TransportError;
use futures_channel::mpsc::UnboundedSender;
use serde::{Deserialize, Serialize};
use url::Url;

use super::manager::Event;

/// Connection state for the notification socket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    /// Status string shown by the presentation layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for auto-reconnect behavior.
///
/// Retries happen at a fixed interval; there is no backoff or jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Unexpected closures that may be retried before giving up. `0`
    /// disables auto-reconnect: the first unexpected close is final.
    pub max_attempts: u32,
    /// Delay before each retry, in milliseconds
    pub interval_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval_ms: 5000,
        }
    }
}

impl ReconnectConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Whether another retry is allowed after `attempts` retries.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Something that happened on an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// A transport-level error. A `Closed` event follows.
    Error(String),
    /// The connection is gone.
    Closed,
}

/// Where a transport reports its events.
///
/// Each sink is bound to one connection attempt; events from a connection the
/// manager has already torn down are discarded.
#[derive(Debug, Clone)]
pub struct EventSink {
    events: UnboundedSender<Event>,
    generation: u64,
}

impl EventSink {
    pub(crate) fn new(events: UnboundedSender<Event>, generation: u64) -> Self {
        Self { events, generation }
    }

    /// Report an event. Returns `false` once the manager has shut down.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events
            .unbounded_send(Event::Transport {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Outbound side of an open transport. Dropping it closes the connection.
#[derive(Debug)]
pub struct TransportLink {
    outbound: UnboundedSender<String>,
}

impl TransportLink {
    pub fn new(outbound: UnboundedSender<String>) -> Self {
        Self { outbound }
    }

    /// Queue a text frame for the socket.
    pub fn send_text(&self, text: String) -> bool {
        self.outbound.unbounded_send(text).is_ok()
    }

    pub fn close(self) {
        self.outbound.close_channel();
    }
}

/// Opens connections for the manager.
///
/// `open` only constructs the connection. The handshake result, inbound
/// frames, errors and closure arrive later through `events`.
pub trait Transport: Send + Sync + 'static {
    fn open(&self, url: &Url, events: EventSink) -> Result<TransportLink, TransportError>;
}

/// Reject anything that is not a WebSocket URL.
pub(crate) fn check_scheme(url: &Url) -> Result<(), TransportError> {
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(TransportError::UnsupportedScheme(other.to_string())),
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub use connection_wasm::WebSocketTransport as PlatformTransport;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::TungsteniteTransport as PlatformTransport;

#[cfg(any(test, feature = "testing"))]
pub mod mock;
