//! Push streams.
//!
//! A [`PushStream`] is one independent pipeline: its own connection, topic
//! routing, dispatcher, buffer and notification gate. Streams share nothing
//! but the connector and the identity they read.

pub mod buffer;
pub mod catalog;
pub mod dispatcher;
pub mod events;
pub mod gate;
pub mod router;
pub mod session;
pub mod view;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::identity::Identity;
use crate::notify::{NotificationStyle, Notifier};
use crate::transport::Connector;

pub use buffer::{BufferEntry, InsertPolicy, NotificationBuffer, Snapshot};
pub use dispatcher::{Dispatched, Dispatcher};
pub use events::FeedEvent;
pub use gate::{GatePolicy, NotificationGate};
pub use router::{compute_topics, RouteKind, Scope, TopicPlan, TopicRoute, TopicTemplate};
pub use session::{ConnectionState, SessionState, SubscriptionHandle};
pub use view::{BufferView, StatusView};

use session::{session_label, SessionWorker};

/// Session timing shared by every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Fixed wait between losing a connection and the next attempt.
    pub reconnect_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Static description of one stream.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub name: &'static str,
    pub topics: TopicPlan,
    pub capacity: usize,
    pub insert_policy: InsertPolicy,
    /// `None` means the stream never surfaces desktop notifications.
    pub gate: Option<GatePolicy>,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct PushStream<E: FeedEvent> {
    spec: StreamSpec,
    settings: SessionSettings,
    connector: Arc<dyn Connector>,
    identity: watch::Receiver<Option<Identity>>,
    buffer: Arc<NotificationBuffer<E>>,
    gate: Option<Arc<NotificationGate>>,
    state: Arc<watch::Sender<SessionState>>,
    running: Mutex<Option<Running>>,
}

impl<E: FeedEvent> PushStream<E> {
    pub fn new(
        spec: StreamSpec,
        settings: SessionSettings,
        connector: Arc<dyn Connector>,
        identity: watch::Receiver<Option<Identity>>,
    ) -> Self {
        let buffer = Arc::new(NotificationBuffer::new(spec.capacity, spec.insert_policy));
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            spec,
            settings,
            connector,
            identity,
            buffer,
            gate: None,
            state: Arc::new(state),
            running: Mutex::new(None),
        }
    }

    /// Grant the notification capability. Without it the stream only buffers.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, style: NotificationStyle) -> Self {
        self.gate = self
            .spec
            .gate
            .map(|policy| Arc::new(NotificationGate::new(policy, notifier, style)));
        self
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn spec(&self) -> &StreamSpec {
        &self.spec
    }

    /// Start the session. A no-op while one is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn activate(&self) {
        let mut running = self.running.lock();
        if let Some(current) = running.as_ref() {
            if !current.task.is_finished() {
                tracing::debug!(stream = self.spec.name, "already active");
                return;
            }
        }

        let cancel = CancellationToken::new();
        let label = session_label();
        tracing::info!(stream = self.spec.name, session = %label, "activating");

        let worker = SessionWorker {
            label,
            stream: self.spec.name,
            plan: self.spec.topics.clone(),
            settings: self.settings,
            connector: Arc::clone(&self.connector),
            identity: self.identity.clone(),
            identity_open: true,
            dispatcher: Dispatcher::new(self.spec.name, Arc::clone(&self.buffer), self.gate.clone()),
            state: Arc::clone(&self.state),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());
        *running = Some(Running { cancel, task });
    }

    /// Stop the session, cancel any pending reconnect and release all
    /// subscriptions. The buffer is kept. Safe to call repeatedly.
    pub async fn deactivate(&self) {
        let running = self.running.lock().take();
        if let Some(Running { cancel, task }) = running {
            cancel.cancel();
            if let Err(err) = task.await {
                tracing::error!(stream = self.spec.name, error = %err, "session task failed");
            }
            tracing::info!(stream = self.spec.name, "deactivated");
        }

        // An activate that ran while we were joining owns the state now.
        if self.running.lock().is_some() {
            tracing::debug!(stream = self.spec.name, "reactivated during teardown");
            return;
        }
        if let Some(gate) = &self.gate {
            gate.reset();
        }
        self.state.send_if_modified(|state| {
            let changed = *state != SessionState::Idle;
            *state = SessionState::Idle;
            changed
        });
    }

    pub fn is_active(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn status(&self) -> StatusView {
        StatusView::new(self.state.subscribe())
    }

    pub fn snapshot(&self) -> Snapshot<E> {
        self.buffer.snapshot()
    }

    pub fn view(&self) -> BufferView<E> {
        self.buffer.view()
    }

    pub fn clear_buffer(&self) {
        self.buffer.clear();
    }

    pub fn gate(&self) -> Option<&Arc<NotificationGate>> {
        self.gate.as_ref()
    }
}

impl<E: FeedEvent> Drop for PushStream<E> {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}
