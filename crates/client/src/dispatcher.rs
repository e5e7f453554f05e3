//! Notification dispatcher.
//!
//! Owns the connection manager and the notification feed. Inbound server
//! events are classified and recorded; the presentation layer reads the feed
//! and connection state through `watch` receivers.

use std::collections::BTreeSet;
use std::sync::Arc;

use counselflow_shared::{ClientCommand, NewNotification, Notification, Payload, RawMessage};
use serde::Serialize;
use tokio::sync::watch;

use crate::classify::{classify, Classified};
use crate::config::ClientConfig;
use crate::storage::TokenProvider;
use crate::stores::{materialize, NotificationFeed};
use crate::ws::{
    ConnectionCallbacks, ConnectionManager, ConnectionState, ManagerConfig, PlatformTransport,
    Transport, UrlBuilder,
};

/// State written from the manager's callbacks as well as the public API.
struct Shared {
    feed: watch::Sender<NotificationFeed>,
    system_status: watch::Sender<Option<Payload>>,
    topics: watch::Sender<BTreeSet<String>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            feed: watch::channel(NotificationFeed::new()).0,
            system_status: watch::channel(None).0,
            topics: watch::channel(BTreeSet::new()).0,
        }
    }

    fn dispatch(&self, message: RawMessage) -> Option<Notification> {
        match classify(&message) {
            Classified::Notify(fields) => Some(self.record(fields)),
            Classified::SystemStatus(payload) => {
                crate::log_debug!("System status update: {:?}", payload);
                self.system_status.send_replace(Some(payload));
                None
            }
            Classified::RoomSubscribed(room) => {
                self.topics.send_if_modified(|topics| topics.insert(room));
                None
            }
            Classified::RoomUnsubscribed(room) => {
                self.topics.send_if_modified(|topics| topics.remove(&room));
                None
            }
            Classified::ServerError(detail) => {
                crate::log_warn!("Server reported an error: {}", detail);
                None
            }
            Classified::Observed => None,
            Classified::Unrecognized => {
                crate::log_info!("Unknown message type: {}", message.kind);
                None
            }
        }
    }

    fn record(&self, fields: NewNotification) -> Notification {
        let notification = materialize(fields);
        self.feed.send_if_modified(|feed| feed.push(notification.clone()));
        notification
    }

    fn forget_topics(&self) {
        self.topics.send_if_modified(|topics| {
            let had_any = !topics.is_empty();
            topics.clear();
            had_any
        });
    }
}

pub struct NotificationDispatcher {
    manager: ConnectionManager,
    tokens: Arc<dyn TokenProvider>,
    shared: Arc<Shared>,
}

impl NotificationDispatcher {
    /// Dispatcher over the platform's WebSocket transport.
    pub fn platform(config: &ClientConfig, tokens: impl TokenProvider + 'static) -> Self {
        Self::new(config, PlatformTransport::default(), tokens)
    }

    /// On native targets this must be called inside a tokio runtime.
    pub fn new(
        config: &ClientConfig,
        transport: impl Transport,
        tokens: impl TokenProvider + 'static,
    ) -> Self {
        let tokens: Arc<dyn TokenProvider> = Arc::new(tokens);
        let shared = Arc::new(Shared::new());

        let url_builder: UrlBuilder = {
            let tokens = tokens.clone();
            let config = config.clone();
            Arc::new(move || {
                let token = tokens.token()?;
                match config.endpoint(&token) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        crate::log_error!("Cannot build socket URL: {}", e);
                        None
                    }
                }
            })
        };

        let manager = ConnectionManager::new_cyclic(
            ManagerConfig::from(config),
            transport,
            url_builder,
            |handle| {
                let on_message = shared.clone();
                let on_disconnect = shared.clone();
                let handle = handle.clone();
                ConnectionCallbacks::new()
                    .on_message(move |message| {
                        on_message.dispatch(message);
                    })
                    .on_connect(move || {
                        crate::log_info!("WebSocket connected for notifications");
                        handle.send(&ClientCommand::RequestStatus {});
                    })
                    .on_disconnect(move || {
                        crate::log_info!("WebSocket disconnected");
                        on_disconnect.forget_topics();
                    })
                    .on_error(|detail| crate::log_error!("WebSocket error: {}", detail))
            },
        );

        Self {
            manager,
            tokens,
            shared,
        }
    }

    // --- Connection ---

    /// Start connecting. Returns `false` without touching the socket when no
    /// auth token is available.
    pub fn connect(&self) -> bool {
        if self.tokens.token().is_none() {
            crate::log_warn!("No access token available, not connecting");
            return false;
        }
        self.manager.connect();
        true
    }

    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        self.manager.send(message)
    }

    /// Ask the server to deliver events for `topic`. No-op when disconnected.
    pub fn subscribe_to_topic(&self, topic: &str) -> bool {
        self.manager.send(&ClientCommand::subscribe(topic))
    }

    pub fn unsubscribe_from_topic(&self, topic: &str) -> bool {
        self.manager.send(&ClientCommand::unsubscribe(topic))
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// One of `disconnected`, `connecting`, `connected`, `error`.
    pub fn connection_status(&self) -> &'static str {
        self.connection_state().as_str()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    pub fn connection_changes(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch()
    }

    // --- Inbound ---

    /// Classify and record one inbound message. Returns the notification it
    /// produced, if any.
    pub fn handle_raw_message(&self, message: RawMessage) -> Option<Notification> {
        self.shared.dispatch(message)
    }

    /// Payload of the most recent `system_status` message.
    pub fn last_system_status(&self) -> Option<Payload> {
        self.shared.system_status.borrow().clone()
    }

    /// Topics the server has acknowledged on the current connection.
    pub fn confirmed_topics(&self) -> BTreeSet<String> {
        self.shared.topics.borrow().clone()
    }

    // --- Feed ---

    pub fn add_notification(&self, fields: NewNotification) -> Notification {
        self.shared.record(fields)
    }

    pub fn mark_as_read(&self, id: &str) {
        self.shared.feed.send_if_modified(|feed| feed.mark_read(id));
    }

    pub fn mark_all_as_read(&self) {
        self.shared.feed.send_if_modified(|feed| feed.mark_all_read());
    }

    pub fn remove(&self, id: &str) -> Option<Notification> {
        let mut removed = None;
        self.shared.feed.send_if_modified(|feed| {
            removed = feed.remove(id);
            removed.is_some()
        });
        removed
    }

    pub fn clear_all(&self) {
        self.shared.feed.send_if_modified(|feed| feed.clear());
    }

    /// Snapshot of the feed, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.shared.feed.borrow().as_slice().to_vec()
    }

    pub fn unread_count(&self) -> usize {
        self.shared.feed.borrow().unread_count()
    }

    /// Receiver notified on every feed change.
    pub fn feed(&self) -> watch::Receiver<NotificationFeed> {
        self.shared.feed.subscribe()
    }
}
