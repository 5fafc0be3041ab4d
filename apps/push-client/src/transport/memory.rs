//! In-process broker.
//!
//! Stands in for the STOMP endpoint in tests and local demos. Connections
//! register their subscriptions here synchronously, so a publish issued after
//! a stream reports `Connected` reaches it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::error::TransportError;

use super::{Connection, Connector, TransportEvent, TransportLink};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct LinkState {
    /// Subscription id -> destination.
    subscriptions: HashMap<String, String>,
    events: mpsc::Sender<TransportEvent>,
}

#[derive(Default)]
struct BrokerState {
    next_link: u64,
    connect_attempts: usize,
    refusing: bool,
    links: HashMap<u64, LinkState>,
}

struct Shared {
    state: Mutex<BrokerState>,
    /// Bumped on every subscription or connection change.
    version: watch::Sender<u64>,
}

impl Shared {
    fn touch(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

/// Cloneable handle to one in-memory broker.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                version,
            }),
        }
    }

    /// Deliver `body` to every connection subscribed to `destination`.
    /// Returns the number of subscriptions that received it.
    pub fn publish(&self, destination: &str, body: &str) -> usize {
        let state = self.shared.state.lock();
        let mut delivered = 0;
        for link in state.links.values() {
            for (id, subscribed) in &link.subscriptions {
                if subscribed != destination {
                    continue;
                }
                let event = TransportEvent::Message {
                    destination: destination.to_string(),
                    subscription: Some(id.clone()),
                    body: body.to_string(),
                };
                if link.events.try_send(event).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Close every live connection as if the network dropped.
    pub fn drop_connections(&self) {
        let links: Vec<LinkState> = {
            let mut state = self.shared.state.lock();
            state.links.drain().map(|(_, link)| link).collect()
        };
        for link in links {
            let _ = link
                .events
                .try_send(TransportEvent::Closed(Some("dropped by broker".to_string())));
        }
        self.shared.touch();
    }

    /// Report a protocol error on every live connection, then close them.
    pub fn push_error(&self, message: &str) {
        let links: Vec<LinkState> = {
            let mut state = self.shared.state.lock();
            state.links.drain().map(|(_, link)| link).collect()
        };
        for link in links {
            let _ = link.events.try_send(TransportEvent::Error(message.to_string()));
            let _ = link
                .events
                .try_send(TransportEvent::Closed(Some(message.to_string())));
        }
        self.shared.touch();
    }

    /// Refuse (or accept again) new connections.
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.state.lock().refusing = refusing;
    }

    /// Connection attempts seen so far, refused ones included.
    pub fn connect_attempts(&self) -> usize {
        self.shared.state.lock().connect_attempts
    }

    pub fn live_connections(&self) -> usize {
        self.shared.state.lock().links.len()
    }

    /// Sorted destinations across all live subscriptions.
    pub fn subscriptions(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        let mut destinations: Vec<String> = state
            .links
            .values()
            .flat_map(|link| link.subscriptions.values().cloned())
            .collect();
        destinations.sort();
        destinations
    }

    pub fn is_subscribed(&self, destination: &str) -> bool {
        let state = self.shared.state.lock();
        state
            .links
            .values()
            .any(|link| link.subscriptions.values().any(|d| d == destination))
    }

    /// Wait until `pred` holds, re-checking after every broker change.
    pub async fn wait_until(&self, pred: impl Fn(&MemoryBroker) -> bool) {
        let mut changes = self.shared.version.subscribe();
        while !pred(self) {
            if changes.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, _credential: Option<&str>) -> Result<Connection, TransportError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let id = {
            let mut state = self.shared.state.lock();
            state.connect_attempts += 1;
            if state.refusing {
                drop(state);
                self.shared.touch();
                return Err(TransportError::Rejected("broker refusing connections".to_string()));
            }
            let id = state.next_link;
            state.next_link += 1;
            state.links.insert(
                id,
                LinkState {
                    subscriptions: HashMap::new(),
                    events: tx,
                },
            );
            id
        };
        self.shared.touch();

        Ok(Connection {
            link: Box::new(MemoryLink {
                id,
                shared: Arc::clone(&self.shared),
            }),
            events: rx,
        })
    }
}

struct MemoryLink {
    id: u64,
    shared: Arc<Shared>,
}

impl TransportLink for MemoryLink {
    fn subscribe(&self, id: &str, destination: &str) -> Result<(), TransportError> {
        {
            let mut state = self.shared.state.lock();
            let link = state.links.get_mut(&self.id).ok_or(TransportError::Closed)?;
            link.subscriptions.insert(id.to_string(), destination.to_string());
        }
        self.shared.touch();
        Ok(())
    }

    fn unsubscribe(&self, id: &str) -> Result<(), TransportError> {
        {
            let mut state = self.shared.state.lock();
            let link = state.links.get_mut(&self.id).ok_or(TransportError::Closed)?;
            link.subscriptions.remove(id);
        }
        self.shared.touch();
        Ok(())
    }

    fn close(&self) {
        let removed = self.shared.state.lock().links.remove(&self.id).is_some();
        if removed {
            self.shared.touch();
        }
    }
}
