//! WebSocket connection layer for the notification socket.
//!
//! This module provides:
//! - Connection management with auto-reconnect and keepalive
//! - A transport seam with native, browser and in-memory implementations
//! - State observation through a `watch` channel
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               NotificationDispatcher                │
//! │   (classifies inbound events, owns the feed)        │
//! └─────────────────────────────────────────────────────┘
//!                 │ callbacks ▲     │ connect / send
//!                 ▼           │     ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                 ConnectionManager                   │
//! │  (actor task: state, reconnect timer, heartbeat)    │
//! └─────────────────────────────────────────────────────┘
//!                 ▲ TransportEvent    │ text frames
//!                 │                   ▼
//!   ┌──────────────────┐ ┌──────────────────┐ ┌──────────────┐
//!   │TungsteniteTransp.│ │WebSocketTransport│ │MockTransport │
//!   │ (native)         │ │ (wasm32)         │ │ (tests)      │
//!   └──────────────────┘ └──────────────────┘ └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let manager = ConnectionManager::new(
//!     ManagerConfig::default(),
//!     PlatformTransport::default(),
//!     Arc::new(|| Url::parse("ws://localhost:8000/api/v1/ws/ws/token").ok()),
//!     ConnectionCallbacks::new().on_message(|m| println!("{}", m.kind)),
//! );
//! manager.connect();
//! ```

mod connection;
mod manager;

pub use connection::{
    ConnectionState, EventSink, PlatformTransport, ReconnectConfig, Transport, TransportEvent,
    TransportLink,
};
pub use manager::{
    ConnectionCallbacks, ConnectionHandle, ConnectionManager, ManagerConfig, UrlBuilder,
};

#[cfg(any(test, feature = "testing"))]
pub use connection::mock;
