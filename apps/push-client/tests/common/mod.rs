#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use push_client::stream::events::FeedEvent;
use push_client::stream::{InsertPolicy, PushStream, SessionSettings, StreamSpec, TopicPlan, TopicTemplate};
use push_client::transport::Connection;
use push_client::{Connector, Identity, IdentityProvider, MemoryBroker, TransportError};
use tradewatch_common::topic;

/// Upper bound for any single wait in a test. Virtual time under a paused clock.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Await `fut`, failing the test if it takes longer than [`TEST_TIMEOUT`].
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("timed out waiting")
}

/// Signals stream listening on the global topic only.
pub fn broadcast_signals() -> StreamSpec {
    StreamSpec {
        name: "broadcast-signals",
        topics: TopicPlan::broadcast(vec![TopicTemplate::events(topic::SIGNALS)]),
        capacity: 20,
        insert_policy: InsertPolicy::Prepend,
        gate: None,
    }
}

pub fn identity(user_id: Option<&str>) -> IdentityProvider {
    IdentityProvider::new(user_id.map(Identity::new))
}

/// A stream on the in-memory broker with the default 5s reconnect delay.
pub fn stream<E: FeedEvent>(
    spec: StreamSpec,
    broker: &MemoryBroker,
    identity: &IdentityProvider,
) -> PushStream<E> {
    PushStream::new(
        spec,
        SessionSettings::default(),
        Arc::new(broker.clone()),
        identity.subscribe(),
    )
}

pub fn signal_payload(code: &str, signal_type: &str, score: f64) -> String {
    serde_json::json!({
        "code": code,
        "signalType": signal_type,
        "score": score,
    })
    .to_string()
}

pub fn price_alert_payload(alert_id: i64, code: &str, current_price: f64) -> String {
    serde_json::json!({
        "alertId": alert_id,
        "code": code,
        "condition": "ABOVE",
        "targetPrice": current_price - 1.0,
        "currentPrice": current_price,
    })
    .to_string()
}

pub fn stats_payload(code: &str, price: f64) -> String {
    serde_json::json!({
        "code": code,
        "price": price,
        "changePercent": 1.5,
    })
    .to_string()
}

/// Connects through a `MemoryBroker`, remembering every credential presented.
pub struct RecordingConnector {
    broker: MemoryBroker,
    credentials: Mutex<Vec<Option<String>>>,
}

impl RecordingConnector {
    pub fn new(broker: &MemoryBroker) -> Self {
        Self {
            broker: broker.clone(),
            credentials: Mutex::new(Vec::new()),
        }
    }

    pub fn credentials(&self) -> Vec<Option<String>> {
        self.credentials.lock().clone()
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self, credential: Option<&str>) -> Result<Connection, TransportError> {
        self.credentials.lock().push(credential.map(str::to_string));
        self.broker.connect(credential).await
    }
}

/// Holds every connect attempt until [`GatedConnector::open`] is called.
pub struct GatedConnector {
    broker: MemoryBroker,
    open: watch::Sender<bool>,
    started: Mutex<usize>,
}

impl GatedConnector {
    pub fn new(broker: &MemoryBroker) -> Self {
        let (open, _) = watch::channel(false);
        Self {
            broker: broker.clone(),
            open,
            started: Mutex::new(0),
        }
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    /// Connect attempts that reached the gate.
    pub fn started(&self) -> usize {
        *self.started.lock()
    }
}

#[async_trait]
impl Connector for GatedConnector {
    async fn connect(&self, credential: Option<&str>) -> Result<Connection, TransportError> {
        *self.started.lock() += 1;
        let mut open = self.open.subscribe();
        if open.wait_for(|open| *open).await.is_err() {
            return Err(TransportError::Closed);
        }
        self.broker.connect(credential).await
    }
}
