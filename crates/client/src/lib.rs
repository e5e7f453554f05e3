//! CounselFlow notification client
//!
//! Keeps a WebSocket open to the CounselFlow backend, turns server events
//! into user-facing notifications and exposes them to a presentation layer.
//! Runs natively on tokio and in the browser on wasm32.

pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod runtime;
pub mod storage;
pub mod stores;
pub mod ws;

pub use config::ClientConfig;
pub use dispatcher::NotificationDispatcher;
pub use stores::{NotificationFeed, NotificationFilter};
pub use ws::{ConnectionManager, ConnectionState};
