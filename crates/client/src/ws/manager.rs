//! Connection manager: lifecycle, auto-reconnect and keepalive for the socket.
//!
//! All state lives in a single actor task. Public calls, transport events,
//! timer expiries and heartbeat ticks are queued on one channel and handled
//! in order, so state transitions never interleave.

use std::sync::Arc;
use std::time::Duration;

use counselflow_shared::{ClientCommand, RawMessage};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::future::{AbortHandle, Abortable};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use url::Url;

use super::connection::{
    ConnectionState, EventSink, ReconnectConfig, Transport, TransportEvent, TransportLink,
};
use crate::config::ClientConfig;
use crate::runtime;

/// Builds the endpoint URL; called once per connection attempt.
/// `None` means there are no credentials to connect with.
pub type UrlBuilder = Arc<dyn Fn() -> Option<Url> + Send + Sync>;

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Lifecycle callbacks, invoked from the manager's task. They must not block.
#[derive(Clone)]
pub struct ConnectionCallbacks {
    on_message: Callback<RawMessage>,
    on_connect: Callback<()>,
    on_disconnect: Callback<()>,
    on_error: Callback<String>,
}

impl Default for ConnectionCallbacks {
    fn default() -> Self {
        Self {
            on_message: Arc::new(|_: RawMessage| {}),
            on_connect: Arc::new(|_: ()| {}),
            on_disconnect: Arc::new(|_: ()| {}),
            on_error: Arc::new(|_: String| {}),
        }
    }
}

impl ConnectionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(mut self, f: impl Fn(RawMessage) + Send + Sync + 'static) -> Self {
        self.on_message = Arc::new(f);
        self
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Arc::new(move |_: ()| f());
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Arc::new(move |_: ()| f());
        self
    }

    pub fn on_error(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_error = Arc::new(f);
        self
    }
}

/// Timing knobs for the manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    pub reconnect: ReconnectConfig,
    /// Zero disables the keepalive.
    pub heartbeat_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for ManagerConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            reconnect: config.reconnect.clone(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Event {
    Connect,
    Disconnect,
    Send(String),
    Transport { generation: u64, event: TransportEvent },
    ReconnectDue { token: u64 },
    Heartbeat { generation: u64 },
    Shutdown,
}

/// Cloneable handle for commanding the manager and observing its state.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    events: UnboundedSender<Event>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Open the connection unless one is already opening or open.
    pub fn connect(&self) {
        let _ = self.events.unbounded_send(Event::Connect);
    }

    /// Cancel any pending reconnect and close the connection.
    pub fn disconnect(&self) {
        let _ = self.events.unbounded_send(Event::Disconnect);
    }

    /// Queue a message for the server. Returns `false` when not connected or
    /// when the message cannot be serialized.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        if !self.state().is_connected() {
            crate::log_debug!("Not connected, dropping outbound message");
            return false;
        }
        match serde_json::to_string(message) {
            Ok(json) => self.events.unbounded_send(Event::Send(json)).is_ok(),
            Err(e) => {
                crate::log_error!("Serialize failed: {}", e);
                false
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver that observes every state transition.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

/// Owns the connection actor. Dropping the manager shuts the actor down and
/// closes the connection without invoking callbacks.
///
/// On native targets it must be created inside a tokio runtime.
pub struct ConnectionManager {
    handle: ConnectionHandle,
}

impl ConnectionManager {
    pub fn new(
        config: ManagerConfig,
        transport: impl Transport,
        url_builder: UrlBuilder,
        callbacks: ConnectionCallbacks,
    ) -> Self {
        Self::new_cyclic(config, transport, url_builder, |_| callbacks)
    }

    /// Like [`ConnectionManager::new`], but the callbacks are built with a
    /// handle to the manager so they can send from inside a callback.
    pub fn new_cyclic(
        config: ManagerConfig,
        transport: impl Transport,
        url_builder: UrlBuilder,
        make_callbacks: impl FnOnce(&ConnectionHandle) -> ConnectionCallbacks,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let handle = ConnectionHandle {
            events: events_tx.clone(),
            state: state_rx,
        };
        let callbacks = make_callbacks(&handle);

        let actor = Actor {
            config,
            transport: Arc::new(transport),
            url_builder,
            callbacks,
            events: events_tx,
            state: state_tx,
            link: None,
            generation: 0,
            attempts: 0,
            reconnect: None,
            next_timer_token: 0,
            heartbeat: None,
        };
        runtime::spawn(actor.run(events_rx));

        Self { handle }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    pub fn connect(&self) {
        self.handle.connect();
    }

    pub fn disconnect(&self) {
        self.handle.disconnect();
    }

    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        self.handle.send(message)
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.handle.watch()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.handle.events.unbounded_send(Event::Shutdown);
    }
}

struct PendingReconnect {
    token: u64,
    abort: AbortHandle,
}

struct Actor {
    config: ManagerConfig,
    transport: Arc<dyn Transport>,
    url_builder: UrlBuilder,
    callbacks: ConnectionCallbacks,
    events: UnboundedSender<Event>,
    state: watch::Sender<ConnectionState>,
    link: Option<TransportLink>,
    /// Identifies the current connection attempt; older transport events are stale.
    generation: u64,
    /// Retries since the last successful open.
    attempts: u32,
    reconnect: Option<PendingReconnect>,
    next_timer_token: u64,
    heartbeat: Option<AbortHandle>,
}

impl Actor {
    async fn run(mut self, mut inbox: UnboundedReceiver<Event>) {
        while let Some(event) = inbox.next().await {
            match event {
                Event::Connect => self.handle_connect(),
                Event::Disconnect => self.handle_disconnect(),
                Event::Send(json) => self.handle_send(json),
                Event::Transport { generation, event } => {
                    if generation == self.generation && self.link.is_some() {
                        self.handle_transport(event);
                    }
                }
                Event::ReconnectDue { token } => self.handle_reconnect_due(token),
                Event::Heartbeat { generation } => self.handle_heartbeat(generation),
                Event::Shutdown => {
                    self.teardown();
                    break;
                }
            }
        }
        crate::log_debug!("Connection manager stopped");
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    fn handle_connect(&mut self) {
        let state = self.current();
        if state.is_connected() || state.is_connecting() {
            crate::log_debug!("connect() ignored, already {}", state);
            return;
        }
        // A manual connect starts a fresh retry budget
        self.cancel_reconnect();
        self.attempts = 0;
        self.open();
    }

    fn handle_disconnect(&mut self) {
        // Cancel the timer before closing so a late expiry cannot reopen
        self.cancel_reconnect();
        self.stop_heartbeat();

        let had_link = match self.link.take() {
            Some(link) => {
                link.close();
                true
            }
            None => false,
        };
        self.set_state(ConnectionState::Disconnected);

        if had_link {
            crate::log_info!("Disconnected by request");
            (self.callbacks.on_disconnect)(());
        }
    }

    fn handle_send(&mut self, json: String) {
        match &self.link {
            Some(link) if self.current().is_connected() => {
                if !link.send_text(json) {
                    crate::log_warn!("Transport writer is gone, message dropped");
                }
            }
            _ => crate::log_debug!("Connection closed before message could be sent"),
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.set_state(ConnectionState::Connected);
                self.attempts = 0;
                self.start_heartbeat();
                crate::log_info!("WebSocket connected");
                (self.callbacks.on_connect)(());
            }
            TransportEvent::Message(text) => match RawMessage::decode(&text) {
                Ok(message) => (self.callbacks.on_message)(message),
                Err(e) => crate::log_warn!("Discarding inbound frame: {}", e),
            },
            TransportEvent::Error(detail) => {
                crate::log_error!("WebSocket error: {}", detail);
                self.set_state(ConnectionState::Error);
                (self.callbacks.on_error)(detail);
            }
            TransportEvent::Closed => self.handle_closed(),
        }
    }

    /// The link went away without a `disconnect()`.
    fn handle_closed(&mut self) {
        self.link = None;
        self.stop_heartbeat();
        self.set_state(ConnectionState::Disconnected);
        crate::log_info!("WebSocket closed");
        (self.callbacks.on_disconnect)(());

        let reconnect = &self.config.reconnect;
        if reconnect.allows(self.attempts) {
            self.attempts += 1;
            crate::log_info!(
                "Reconnecting in {}ms (attempt {}/{})",
                reconnect.interval_ms,
                self.attempts,
                reconnect.max_attempts
            );
            self.schedule_reconnect();
        } else {
            crate::log_warn!(
                "Giving up after {} reconnect attempts",
                reconnect.max_attempts
            );
        }
    }

    fn handle_reconnect_due(&mut self, token: u64) {
        let due = self.reconnect.as_ref().is_some_and(|p| p.token == token);
        if due {
            self.reconnect = None;
            self.open();
        } else {
            crate::log_debug!("Ignoring cancelled reconnect timer");
        }
    }

    fn handle_heartbeat(&mut self, generation: u64) {
        if generation != self.generation || !self.current().is_connected() {
            return;
        }
        let Some(link) = &self.link else {
            return;
        };
        match serde_json::to_string(&ClientCommand::heartbeat()) {
            Ok(json) => {
                link.send_text(json);
            }
            Err(e) => crate::log_error!("Serialize failed: {}", e),
        }
    }

    /// Start a connection attempt.
    fn open(&mut self) {
        if let Some(stale) = self.link.take() {
            stale.close();
        }
        self.stop_heartbeat();

        let Some(url) = (self.url_builder)() else {
            crate::log_warn!("No endpoint available (missing token?), not connecting");
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        self.generation += 1;
        self.set_state(ConnectionState::Connecting);
        crate::log_info!(
            "Connecting to {}",
            url.host_str().unwrap_or("<unknown host>")
        );

        let sink = EventSink::new(self.events.clone(), self.generation);
        match self.transport.open(&url, sink) {
            Ok(link) => self.link = Some(link),
            Err(e) => {
                crate::log_error!("WebSocket connection failed: {}", e);
                self.set_state(ConnectionState::Error);
                (self.callbacks.on_error)(e.to_string());
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();
        self.next_timer_token += 1;
        let token = self.next_timer_token;

        let (abort, registration) = AbortHandle::new_pair();
        let events = self.events.clone();
        let delay = self.config.reconnect.interval();
        runtime::spawn(async move {
            if Abortable::new(runtime::sleep(delay), registration)
                .await
                .is_ok()
            {
                let _ = events.unbounded_send(Event::ReconnectDue { token });
            }
        });

        self.reconnect = Some(PendingReconnect { token, abort });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(pending) = self.reconnect.take() {
            pending.abort.abort();
            crate::log_debug!("Cancelled pending reconnect");
        }
    }

    fn start_heartbeat(&mut self) {
        self.stop_heartbeat();
        let interval = self.config.heartbeat_interval;
        if interval.is_zero() {
            return;
        }

        let (abort, registration) = AbortHandle::new_pair();
        let events = self.events.clone();
        let generation = self.generation;
        let ticker = async move {
            loop {
                runtime::sleep(interval).await;
                if events
                    .unbounded_send(Event::Heartbeat { generation })
                    .is_err()
                {
                    break;
                }
            }
        };
        runtime::spawn(async move {
            let _ = Abortable::new(ticker, registration).await;
        });

        self.heartbeat = Some(abort);
    }

    fn stop_heartbeat(&mut self) {
        if let Some(abort) = self.heartbeat.take() {
            abort.abort();
        }
    }

    fn teardown(&mut self) {
        self.cancel_reconnect();
        self.stop_heartbeat();
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::mock::{mock_transport, MockServer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder {
        messages: Arc<Mutex<Vec<RawMessage>>>,
        errors: Arc<Mutex<Vec<String>>>,
        connects: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
    }

    impl Recorder {
        fn callbacks(&self) -> ConnectionCallbacks {
            let messages = self.messages.clone();
            let errors = self.errors.clone();
            let connects = self.connects.clone();
            let disconnects = self.disconnects.clone();
            ConnectionCallbacks::new()
                .on_message(move |m| messages.lock().unwrap().push(m))
                .on_error(move |e| errors.lock().unwrap().push(e))
                .on_connect(move || {
                    connects.fetch_add(1, Ordering::SeqCst);
                })
                .on_disconnect(move || {
                    disconnects.fetch_add(1, Ordering::SeqCst);
                })
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        fn disconnects(&self) -> usize {
            self.disconnects.load(Ordering::SeqCst)
        }

        fn messages(&self) -> Vec<RawMessage> {
            self.messages.lock().unwrap().clone()
        }

        fn errors(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }
    }

    fn config(max_attempts: u32) -> ManagerConfig {
        ManagerConfig {
            reconnect: ReconnectConfig {
                max_attempts,
                interval_ms: 1000,
            },
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    fn endpoint() -> UrlBuilder {
        Arc::new(|| Url::parse("ws://localhost:8000/api/v1/ws/ws/token").ok())
    }

    fn setup(max_attempts: u32) -> (ConnectionManager, MockServer, Recorder) {
        let (transport, server) = mock_transport();
        let recorder = Recorder::default();
        let manager =
            ConnectionManager::new(config(max_attempts), transport, endpoint(), recorder.callbacks());
        (manager, server, recorder)
    }

    async fn wait_for_state(manager: &ConnectionManager, expected: ConnectionState) {
        let mut rx = manager.watch();
        rx.wait_for(|state| *state == expected)
            .await
            .expect("manager dropped");
    }

    /// Let every queued event and timer run.
    async fn settle() {
        tokio::time::sleep(Duration::from_secs(600)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_opens_and_reports_connected() {
        let (manager, mut server, recorder) = setup(3);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.connect();
        let link = server.next_link().await;
        assert_eq!(link.url.path(), "/api/v1/ws/ws/token");
        wait_for_state(&manager, ConnectionState::Connecting).await;

        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;
        settle().await;
        assert_eq!(recorder.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent_while_connecting_or_connected() {
        let (manager, mut server, _recorder) = setup(3);

        manager.connect();
        manager.connect();
        let link = server.next_link().await;
        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;
        manager.connect();
        settle().await;

        assert_eq!(server.open_count(), 1);
        assert!(server.try_next_link().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_frames_are_decoded_and_malformed_ones_dropped() {
        let (manager, mut server, recorder) = setup(3);
        manager.connect();
        let link = server.next_link().await;
        link.open();

        link.receive("{not json");
        link.receive(r#"{"type":"task_update","data":{"task_id":"t1"}}"#);
        settle().await;

        let messages = recorder.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, "task_update");
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn naive_server_timestamps_are_delivered() {
        let (manager, mut server, recorder) = setup(3);
        manager.connect();
        let link = server.next_link().await;
        link.open();

        link.receive(
            r#"{"type":"task_update","data":{"task_id":"t1","title":"Review","status":"open","priority":"high"},"timestamp":"2024-06-01T12:00:00.123456"}"#,
        );
        settle().await;

        let messages = recorder.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].timestamp.to_rfc3339(),
            "2024-06-01T12:00:00.123456+00:00"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_requires_connection() {
        let (manager, mut server, _recorder) = setup(3);
        assert!(!manager.send(&ClientCommand::subscribe("room")));

        manager.connect();
        let mut link = server.next_link().await;
        assert!(!manager.send(&ClientCommand::subscribe("room")));

        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;
        assert!(manager.send(&ClientCommand::subscribe("room")));

        let frame = link.next_frame().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "subscribe_room");
        assert_eq!(value["data"]["room_id"], "room");
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_is_sent_every_interval_while_connected() {
        let (manager, mut server, _recorder) = setup(3);
        manager.connect();
        let mut link = server.next_link().await;
        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;

        tokio::time::sleep(Duration::from_secs(61)).await;

        let frames = link.drain_frames();
        assert_eq!(frames.len(), 2);
        for frame in frames {
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value["type"], "heartbeat");
            assert!(value["data"]["timestamp"].is_string());
        }
        // No reply is expected; the connection stays up
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_close_schedules_reconnect() {
        let (manager, mut server, recorder) = setup(3);
        manager.connect();
        let link = server.next_link().await;
        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;

        link.close();
        wait_for_state(&manager, ConnectionState::Disconnected).await;

        let retry = server.next_link().await;
        retry.open();
        wait_for_state(&manager, ConnectionState::Connected).await;
        settle().await;

        assert_eq!(recorder.disconnects(), 1);
        assert_eq!(recorder.connects(), 2);
        assert_eq!(server.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_stops_after_max_attempts() {
        let (manager, mut server, recorder) = setup(3);
        manager.connect();
        let link = server.next_link().await;
        link.open();
        link.close();

        // Three retries that never get past the handshake
        for _ in 0..3 {
            let retry = server.next_link().await;
            retry.close();
        }
        settle().await;

        assert!(server.try_next_link().is_none());
        assert_eq!(server.open_count(), 4);
        assert_eq!(recorder.disconnects(), 4);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // A manual connect restores the budget
        manager.connect();
        let link = server.next_link().await;
        link.close();
        assert!(server.next_link().await.url.path().ends_with("/token"));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_disables_auto_reconnect() {
        let (manager, mut server, recorder) = setup(0);
        manager.connect();
        let link = server.next_link().await;
        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;

        link.close();
        wait_for_state(&manager, ConnectionState::Disconnected).await;
        settle().await;

        assert!(server.try_next_link().is_none());
        assert_eq!(server.open_count(), 1);
        assert_eq!(recorder.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_attempt_count() {
        let (manager, mut server, _recorder) = setup(1);
        manager.connect();
        let link = server.next_link().await;
        link.open();
        link.close();

        let retry = server.next_link().await;
        retry.open();
        wait_for_state(&manager, ConnectionState::Connected).await;
        retry.close();

        let second_retry = server.next_link().await;
        second_retry.close();
        settle().await;

        assert!(server.try_next_link().is_none());
        assert_eq!(server.open_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn error_then_close_reconnects() {
        let (manager, mut server, recorder) = setup(3);
        manager.connect();
        let link = server.next_link().await;
        link.open();

        link.error("connection reset");
        wait_for_state(&manager, ConnectionState::Error).await;
        assert_eq!(recorder.errors(), vec!["connection reset".to_string()]);

        link.close();
        let retry = server.next_link().await;
        assert_eq!(server.open_count(), 2);
        drop(retry);
        assert_eq!(recorder.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn construction_failure_enters_error_without_retry() {
        let (manager, mut server, recorder) = setup(3);
        server.fail_next_open();

        manager.connect();
        wait_for_state(&manager, ConnectionState::Error).await;
        settle().await;

        assert_eq!(recorder.errors().len(), 1);
        assert_eq!(recorder.disconnects(), 0);
        assert!(server.try_next_link().is_none());

        // Error is not terminal; connect() tries again
        manager.connect();
        let link = server.next_link().await;
        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn missing_endpoint_skips_connect() {
        let (transport, mut server) = mock_transport();
        let recorder = Recorder::default();
        let no_endpoint: UrlBuilder = Arc::new(|| None);
        let manager =
            ConnectionManager::new(config(3), transport, no_endpoint, recorder.callbacks());

        manager.connect();
        settle().await;

        assert_eq!(server.open_count(), 0);
        assert!(server.try_next_link().is_none());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_twice_reports_once() {
        let (manager, mut server, recorder) = setup(3);
        manager.connect();
        let mut link = server.next_link().await;
        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;

        manager.disconnect();
        manager.disconnect();
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(recorder.disconnects(), 1);
        assert!(link.is_closed());
        assert!(server.try_next_link().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let (manager, mut server, recorder) = setup(3);
        manager.connect();
        let link = server.next_link().await;
        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;

        link.close();
        wait_for_state(&manager, ConnectionState::Disconnected).await;
        manager.disconnect();
        settle().await;

        assert!(server.try_next_link().is_none());
        assert_eq!(server.open_count(), 1);
        assert_eq!(recorder.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_a_torn_down_link_are_ignored() {
        let (manager, mut server, recorder) = setup(3);
        manager.connect();
        let link = server.next_link().await;
        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;

        manager.disconnect();
        wait_for_state(&manager, ConnectionState::Disconnected).await;
        link.receive(r#"{"type":"task_update","data":{}}"#);
        link.close();
        settle().await;

        assert!(recorder.messages().is_empty());
        assert_eq!(recorder.disconnects(), 1);
        assert!(server.try_next_link().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_can_send_through_the_handle() {
        let (transport, mut server) = mock_transport();
        let manager = ConnectionManager::new_cyclic(config(3), transport, endpoint(), |handle| {
            let handle = handle.clone();
            ConnectionCallbacks::new().on_connect(move || {
                handle.send(&ClientCommand::RequestStatus {});
            })
        });

        manager.connect();
        let mut link = server.next_link().await;
        link.open();

        let frame = link.next_frame().await.unwrap();
        assert_eq!(frame, r#"{"type":"request_status","data":{}}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_manager_closes_the_link_silently() {
        let (manager, mut server, recorder) = setup(3);
        manager.connect();
        let mut link = server.next_link().await;
        link.open();
        wait_for_state(&manager, ConnectionState::Connected).await;

        drop(manager);
        settle().await;

        assert!(link.is_closed());
        assert_eq!(recorder.disconnects(), 0);
    }
}
