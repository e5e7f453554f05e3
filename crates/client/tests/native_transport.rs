//! End-to-end tests against an in-process tokio-tungstenite server.

#![cfg(not(target_arch = "wasm32"))]

use std::time::Duration;

use counselflow_client::storage::StaticTokenProvider;
use counselflow_client::ws::ReconnectConfig;
use counselflow_client::{ClientConfig, ConnectionState, NotificationDispatcher};
use counselflow_shared::{NotificationKind, Priority};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(5);

fn config(ws_url: String) -> ClientConfig {
    ClientConfig {
        ws_url,
        reconnect: ReconnectConfig {
            max_attempts: 0,
            interval_ms: 100,
        },
        heartbeat_interval_ms: 0,
    }
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("socket ended early: {:?}", other),
        }
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn notifications_flow_over_a_real_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut path = String::new();
        let record_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            path = req.uri().path().to_string();
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, record_path)
            .await
            .unwrap();

        assert_eq!(
            next_json(&mut ws).await,
            json!({"type": "request_status", "data": {}})
        );
        ws.send(Message::text(
            json!({"type": "system_status", "data": {"active_users": 2}}).to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::text(
            json!({
                "type": "risk_alert",
                "data": {"risk_id": 42, "severity": "high", "title": "Exposure", "description": "Clause 7"},
                "timestamp": "2024-06-01T12:00:00Z"
            })
            .to_string(),
        ))
        .await
        .unwrap();

        let subscribe = next_json(&mut ws).await;
        assert_eq!(subscribe["type"], "subscribe_room");
        let room = subscribe["data"]["room_id"].clone();
        ws.send(Message::text(
            json!({"type": "room_subscribed", "data": {"room_id": room}}).to_string(),
        ))
        .await
        .unwrap();

        // Hang up once the client has seen the acknowledgement
        tokio::time::sleep(Duration::from_millis(500)).await;
        ws.close(None).await.unwrap();
        path
    });

    let dispatcher = NotificationDispatcher::platform(
        &config(format!("ws://{}/api/v1/ws/ws", addr)),
        StaticTokenProvider::new("tok-123"),
    );
    assert!(dispatcher.connect());

    let mut state = dispatcher.connection_changes();
    timeout(WAIT, state.wait_for(|s| s.is_connected()))
        .await
        .unwrap()
        .unwrap();

    eventually(|| dispatcher.unread_count() == 1).await;
    let n = &dispatcher.notifications()[0];
    assert_eq!(n.kind, NotificationKind::Error);
    assert_eq!(n.priority, Priority::High);
    assert_eq!(n.action_url.as_deref(), Some("/risks/42"));
    assert_eq!(
        dispatcher
            .last_system_status()
            .and_then(|s| s.get("active_users").cloned()),
        Some(json!(2))
    );

    assert!(dispatcher.subscribe_to_topic("matter-7"));
    eventually(|| dispatcher.confirmed_topics().contains("matter-7")).await;

    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
    eventually(|| dispatcher.confirmed_topics().is_empty()).await;
    assert_eq!(dispatcher.connection_status(), "disconnected");

    let path = server.await.unwrap();
    assert_eq!(path, "/api/v1/ws/ws/tok-123");
}

#[tokio::test]
async fn non_websocket_endpoint_enters_error_state() {
    let dispatcher = NotificationDispatcher::platform(
        &config("http://127.0.0.1:9/api/v1/ws/ws".to_string()),
        StaticTokenProvider::new("tok"),
    );
    assert!(dispatcher.connect());

    let mut state = dispatcher.connection_changes();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Error))
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(dispatcher.connection_state(), ConnectionState::Error);
}

#[tokio::test]
async fn refused_connection_settles_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dispatcher = NotificationDispatcher::platform(
        &config(format!("ws://{}/api/v1/ws/ws", addr)),
        StaticTokenProvider::new("tok"),
    );
    assert!(dispatcher.connect());

    // The failed handshake reports an error and a close; with no retries
    // budgeted the dispatcher ends up disconnected
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(dispatcher.connection_state(), ConnectionState::Disconnected);
    assert!(dispatcher.notifications().is_empty());
}
