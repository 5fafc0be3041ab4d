//! STOMP over WebSocket.
//!
//! After the CONNECT/CONNECTED handshake the socket is split into a writer
//! task (outbound frames plus heart-beat EOLs) and a reader task that turns
//! MESSAGE/ERROR frames into [`TransportEvent`]s.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;

use super::frame::{self, Command, Frame, HeartBeat};
use super::{Connection, Connector, TransportEvent, TransportLink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the per-connection inbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct StompConnector {
    url: String,
    host: String,
    heartbeat: HeartBeat,
    connect_timeout: Duration,
}

impl StompConnector {
    pub fn new(url: impl Into<String>, heartbeat: HeartBeat, connect_timeout: Duration) -> Self {
        let url = url.into();
        let host = host_of(&url);
        Self {
            url,
            host,
            heartbeat,
            connect_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the socket, send CONNECT and wait for CONNECTED.
    async fn handshake(&self, credential: Option<&str>) -> Result<(WsStream, HeartBeat), TransportError> {
        let (mut ws, _) = connect_async(self.url.as_str()).await?;

        let connect = Frame::connect(&self.host, self.heartbeat, credential);
        ws.send(Message::Text(connect.encode().into())).await?;

        while let Some(msg) = ws.next().await {
            let text = match msg? {
                Message::Text(text) => text,
                Message::Close(_) => return Err(TransportError::Closed),
                _ => continue,
            };
            if frame::is_heartbeat(text.as_str()) {
                continue;
            }

            let reply = Frame::decode(text.as_str())?;
            match reply.command {
                Command::Connected => {
                    let server = reply
                        .get("heart-beat")
                        .and_then(HeartBeat::parse)
                        .unwrap_or_default();
                    return Ok((ws, server));
                }
                Command::Error => {
                    let message = reply.get("message").unwrap_or("ERROR frame").to_string();
                    return Err(TransportError::Rejected(message));
                }
                _ => continue,
            }
        }
        Err(TransportError::Closed)
    }
}

#[async_trait]
impl Connector for StompConnector {
    async fn connect(&self, credential: Option<&str>) -> Result<Connection, TransportError> {
        let (ws, server_heartbeat) = time::timeout(self.connect_timeout, self.handshake(credential))
            .await
            .map_err(|_| TransportError::Timeout)??;

        let (send_every, expect_within) = self.heartbeat.negotiate(&server_heartbeat);
        tracing::debug!(
            url = %self.url,
            ?send_every,
            ?expect_within,
            "stomp session established"
        );

        let (write, read) = ws.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(write_loop(write, outbound_rx, send_every));
        tokio::spawn(read_loop(read, event_tx, expect_within));

        Ok(Connection {
            link: Box::new(StompLink { outbound: outbound_tx }),
            events: event_rx,
        })
    }
}

struct StompLink {
    outbound: mpsc::UnboundedSender<Frame>,
}

impl TransportLink for StompLink {
    fn subscribe(&self, id: &str, destination: &str) -> Result<(), TransportError> {
        self.outbound
            .send(Frame::subscribe(id, destination))
            .map_err(|_| TransportError::Closed)
    }

    fn unsubscribe(&self, id: &str) -> Result<(), TransportError> {
        self.outbound
            .send(Frame::unsubscribe(id))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.outbound.send(Frame::disconnect());
    }
}

async fn write_loop(
    mut write: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    send_every: Option<Duration>,
) {
    let mut ticker = send_every.map(|period| time::interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                // Link dropped: the owning stream is done with us.
                let Some(frame) = frame else { break };
                let closing = frame.command == Command::Disconnect;
                if let Err(err) = write.send(Message::Text(frame.encode().into())).await {
                    tracing::debug!(?err, "stomp write failed");
                    return;
                }
                if closing {
                    break;
                }
            }
            _ = tick(&mut ticker) => {
                if write.send(Message::Text(frame::HEARTBEAT_EOL.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    }

    let _ = write.send(Message::Close(None)).await;
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    events: mpsc::Sender<TransportEvent>,
    expect_within: Option<Duration>,
) {
    // One missed beat is tolerated before the server is presumed gone.
    let grace = expect_within.map(|period| period * 2);

    let reason = loop {
        let next = match grace {
            Some(limit) => match time::timeout(limit, read.next()).await {
                Ok(next) => next,
                Err(_) => break Some("heart-beat timeout".to_string()),
            },
            None => read.next().await,
        };

        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(close))) => break close.map(|c| c.reason.to_string()),
            Some(Ok(_)) => continue,
            Some(Err(err)) => break Some(err.to_string()),
            None => break None,
        };
        if frame::is_heartbeat(text.as_str()) {
            continue;
        }

        let frame = match Frame::decode(text.as_str()) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(%err, "dropping undecodable stomp frame");
                continue;
            }
        };

        let event = match frame.command {
            Command::Message => TransportEvent::Message {
                destination: frame.get("destination").unwrap_or_default().to_string(),
                subscription: frame.get("subscription").map(str::to_string),
                body: frame.body,
            },
            Command::Error => {
                let message = frame.get("message").unwrap_or("ERROR frame").to_string();
                let _ = events.send(TransportEvent::Error(message.clone())).await;
                // The broker closes the connection after an ERROR frame.
                break Some(message);
            }
            _ => continue,
        };

        if events.send(event).await.is_err() {
            return;
        }
    };

    let _ = events.send(TransportEvent::Closed(reason)).await;
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Host part of a `ws://host:port/path` URL, for the CONNECT `host` header.
fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map(|(_, host)| host).unwrap_or(authority);
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host.to_string(),
        _ => authority.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_taken_from_the_url_authority() {
        assert_eq!(host_of("ws://localhost:8080/ws"), "localhost");
        assert_eq!(host_of("wss://push.example.com/ws"), "push.example.com");
        assert_eq!(host_of("ws://user:pw@10.0.0.2:61614/ws?x=1"), "10.0.0.2");
    }
}
