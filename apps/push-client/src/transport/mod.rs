//! Transport seam between a push stream and the broker.
//!
//! A [`Connector`] opens one logical publish/subscribe connection and hands
//! back a [`Connection`]: a [`TransportLink`] for outbound control (subscribe,
//! unsubscribe, close) and an `mpsc` receiver of [`TransportEvent`]s that the
//! owning stream drains in arrival order.

pub mod frame;
pub mod memory;
pub mod stomp;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

pub use frame::HeartBeat;
pub use memory::MemoryBroker;
pub use stomp::StompConnector;

/// Something the broker pushed to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A payload delivered on a subscribed destination.
    Message {
        destination: String,
        subscription: Option<String>,
        body: String,
    },
    /// Protocol-level error reported by the broker.
    Error(String),
    /// The connection is gone. No further events follow.
    Closed(Option<String>),
}

/// Outbound half of a live connection.
pub trait TransportLink: Send + Sync {
    fn subscribe(&self, id: &str, destination: &str) -> Result<(), TransportError>;
    fn unsubscribe(&self, id: &str) -> Result<(), TransportError>;
    /// Politely end the connection. Safe to call more than once.
    fn close(&self);
}

pub struct Connection {
    pub link: Box<dyn TransportLink>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens connections to the broker endpoint.
///
/// Every call yields an independent connection; streams never share one.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, credential: Option<&str>) -> Result<Connection, TransportError>;
}
