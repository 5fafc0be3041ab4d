mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::routing::get;
use axum::Router;
use tokio::time;

use push_client::stream::events::Signal;
use push_client::stream::{PushStream, SessionSettings};
use push_client::transport::frame::{self, Command, Frame, HeartBeat};
use push_client::transport::TransportEvent;
use push_client::{Connector, Identity, IdentityProvider, SessionState, StompConnector, TransportError};

const TOKEN: &str = "secret";
const FORBIDDEN: &str = "/topic/forbidden";
const SIGNAL_BODY: &str = r#"{"code":"FPT","signalType":"BUY","score":5}"#;

/// Helper: start a minimal STOMP broker over WebSocket.
///
/// `/ws` advertises no heart-beats. `/ws/silent` promises a beat every 100ms
/// and never sends one.
async fn start_broker() -> SocketAddr {
    let app = Router::new()
        .route(
            "/ws",
            get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(|socket| serve_stomp(socket, "0,0")) }),
        )
        .route(
            "/ws/silent",
            get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(|socket| serve_stomp(socket, "100,0")) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Accepts `Authorization: Bearer secret`, and answers every SUBSCRIBE with one
/// signal on the subscribed destination. Subscribing to [`FORBIDDEN`] gets an
/// ERROR frame and the connection dropped.
async fn serve_stomp(mut socket: WebSocket, heart_beat: &'static str) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        if frame::is_heartbeat(text.as_str()) {
            continue;
        }
        let Ok(frame) = Frame::decode(text.as_str()) else {
            continue;
        };

        let reply = match frame.command {
            Command::Connect => {
                let expected = format!("Bearer {TOKEN}");
                if frame.get("Authorization") != Some(expected.as_str()) {
                    let error = Frame::new(Command::Error).header("message", "invalid credentials");
                    let _ = socket.send(Message::Text(error.encode().into())).await;
                    return;
                }
                Frame::new(Command::Connected)
                    .header("version", "1.2")
                    .header("heart-beat", heart_beat)
            }
            Command::Subscribe => {
                let destination = frame.get("destination").unwrap_or_default().to_string();
                if destination == FORBIDDEN {
                    let error = Frame::new(Command::Error).header("message", "forbidden");
                    let _ = socket.send(Message::Text(error.encode().into())).await;
                    return;
                }
                let id = frame.get("id").unwrap_or_default().to_string();
                Frame::new(Command::Message)
                    .header("destination", destination)
                    .header("subscription", id)
                    .header("message-id", "1")
                    .header("content-type", "application/json")
                    .with_body(SIGNAL_BODY)
            }
            Command::Disconnect => return,
            _ => continue,
        };

        if socket.send(Message::Text(reply.encode().into())).await.is_err() {
            return;
        }
    }
}

fn connector(addr: SocketAddr, path: &str, heartbeat: HeartBeat) -> StompConnector {
    StompConnector::new(format!("ws://{addr}{path}"), heartbeat, Duration::from_secs(5))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stomp_connect_subscribe_and_receive() {
    let addr = start_broker().await;
    let connector = connector(addr, "/ws", HeartBeat::default());

    let mut conn = connector.connect(Some(TOKEN)).await.expect("connect");
    conn.link.subscribe("sub-1", "/topic/signals").expect("subscribe");

    let event = time::timeout(Duration::from_secs(5), conn.events.recv())
        .await
        .expect("timeout waiting for MESSAGE")
        .expect("events closed");
    assert_eq!(
        event,
        TransportEvent::Message {
            destination: "/topic/signals".to_string(),
            subscription: Some("sub-1".to_string()),
            body: SIGNAL_BODY.to_string(),
        }
    );

    conn.link.close();
    let event = time::timeout(Duration::from_secs(5), conn.events.recv())
        .await
        .expect("timeout waiting for close")
        .expect("events closed");
    assert!(matches!(event, TransportEvent::Closed(_)));
}

#[tokio::test]
async fn stomp_rejects_bad_credentials() {
    let addr = start_broker().await;
    let connector = connector(addr, "/ws", HeartBeat::default());

    let wrong = connector.connect(Some("nope")).await;
    assert!(matches!(wrong, Err(TransportError::Rejected(ref message)) if message == "invalid credentials"));

    let missing = connector.connect(None).await;
    assert!(matches!(missing, Err(TransportError::Rejected(_))));
}

#[tokio::test]
async fn stomp_unreachable_endpoint_is_an_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = connector(addr, "/ws", HeartBeat::default()).connect(None).await;
    assert!(matches!(result, Err(TransportError::WebSocket(_))));
}

#[tokio::test]
async fn stomp_missing_heartbeats_close_the_connection() {
    let addr = start_broker().await;
    let connector = connector(
        addr,
        "/ws/silent",
        HeartBeat::new(Duration::ZERO, Duration::from_millis(100)),
    );

    let mut conn = connector.connect(Some(TOKEN)).await.expect("connect");
    let event = time::timeout(Duration::from_secs(5), conn.events.recv())
        .await
        .expect("timeout waiting for heart-beat expiry")
        .expect("events closed");
    assert_eq!(event, TransportEvent::Closed(Some("heart-beat timeout".to_string())));
}

#[tokio::test]
async fn stomp_error_frame_while_connected_closes() {
    let addr = start_broker().await;
    let connector = connector(addr, "/ws", HeartBeat::default());

    let mut conn = connector.connect(Some(TOKEN)).await.expect("connect");
    conn.link.subscribe("sub-1", FORBIDDEN).expect("subscribe");

    let mut events = Vec::new();
    for _ in 0..2 {
        let event = time::timeout(Duration::from_secs(5), conn.events.recv())
            .await
            .expect("timeout waiting for event")
            .expect("events closed");
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            TransportEvent::Error("forbidden".to_string()),
            TransportEvent::Closed(Some("forbidden".to_string())),
        ]
    );
}

#[tokio::test]
async fn push_stream_over_stomp() {
    let addr = start_broker().await;
    let identity = IdentityProvider::new(Some(Identity::new("1").with_token(TOKEN)));
    let stream: PushStream<Signal> = PushStream::new(
        common::broadcast_signals(),
        SessionSettings::default(),
        Arc::new(connector(addr, "/ws", HeartBeat::default())),
        identity.subscribe(),
    );
    let mut status = stream.status();
    let mut view = stream.view();

    stream.activate();
    time::timeout(Duration::from_secs(5), status.wait_for(SessionState::Connected))
        .await
        .expect("timeout waiting for Connected");

    let snapshot = time::timeout(Duration::from_secs(5), view.wait_for(|entries| !entries.is_empty()))
        .await
        .expect("timeout waiting for signal")
        .expect("stream dropped");
    assert_eq!(snapshot[0].event.code, "FPT");
    assert_eq!(snapshot[0].event.score, 5.0);

    stream.deactivate().await;
    assert_eq!(stream.state(), SessionState::Idle);
}
