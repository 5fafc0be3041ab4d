//! One stream's connection lifecycle.
//!
//! ```text
//! idle -> activating -> connected <-> disconnected -> activating -> ...
//!                                       any state -> idle (deactivated)
//! ```
//!
//! The worker owns the connection and the dispatcher. Frames are drained from
//! the connection's event channel in arrival order and dispatched inline, so
//! the only suspension points are connecting, waiting out the reconnect
//! delay and waiting for the next frame.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tradewatch_common::id::{prefix, prefixed_ulid};

use crate::error::TransportError;
use crate::identity::Identity;
use crate::transport::{Connection, Connector, TransportEvent, TransportLink};

use super::dispatcher::Dispatcher;
use super::events::FeedEvent;
use super::router::{compute_topics, TopicPlan, TopicRoute};
use super::SessionSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not running, or waiting for an identity.
    Idle,
    /// Opening the connection and subscribing.
    Activating,
    Connected,
    /// Connection lost; a reconnect is scheduled.
    Disconnected,
}

/// Coarse indicator for status badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn connection(self) -> ConnectionState {
        match self {
            SessionState::Idle | SessionState::Disconnected => ConnectionState::Disconnected,
            SessionState::Activating => ConnectionState::Connecting,
            SessionState::Connected => ConnectionState::Connected,
        }
    }
}

/// A live subscription on the current connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: String,
    pub route: TopicRoute,
}

/// Why the connected phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Cancelled,
    Closed,
    /// A user-scoped stream lost its identity.
    IdentityLost,
    /// The connection was authenticated for someone else.
    Reauthenticate,
}

pub(crate) struct SessionWorker<E: FeedEvent> {
    pub(crate) label: String,
    pub(crate) stream: &'static str,
    pub(crate) plan: TopicPlan,
    pub(crate) settings: SessionSettings,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) identity: watch::Receiver<Option<Identity>>,
    pub(crate) identity_open: bool,
    pub(crate) dispatcher: Dispatcher<E>,
    pub(crate) state: Arc<watch::Sender<SessionState>>,
    pub(crate) cancel: CancellationToken,
}

impl<E: FeedEvent> SessionWorker<E> {
    pub(crate) async fn run(mut self) {
        tracing::debug!(stream = self.stream, session = %self.label, "session started");
        let cancel = self.cancel.clone();

        loop {
            let identity = match self.next_identity().await {
                ControlFlow::Continue(identity) => identity,
                ControlFlow::Break(()) => break,
            };

            self.set_state(SessionState::Activating);
            let credential = identity.as_ref().and_then(|i| i.token.clone());
            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.connector.connect(credential.as_deref()) => result,
            };

            match connected {
                Ok(connection) => match self.drive(connection, identity).await {
                    Exit::Cancelled => break,
                    Exit::IdentityLost => {
                        self.set_state(SessionState::Idle);
                        continue;
                    }
                    Exit::Reauthenticate => continue,
                    Exit::Closed => {}
                },
                Err(err) => {
                    tracing::warn!(
                        stream = self.stream,
                        session = %self.label,
                        error = %err,
                        "connect failed"
                    );
                }
            }

            self.set_state(SessionState::Disconnected);
            tracing::info!(
                stream = self.stream,
                session = %self.label,
                delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                "reconnect scheduled"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }
        }

        tracing::debug!(stream = self.stream, session = %self.label, "session stopped");
    }

    /// The identity to connect with. Waits in `Idle` while a user-scoped
    /// stream has none; breaks on cancellation.
    async fn next_identity(&mut self) -> ControlFlow<(), Option<Identity>> {
        let cancel = self.cancel.clone();
        loop {
            if cancel.is_cancelled() {
                return ControlFlow::Break(());
            }
            let current = self.identity.borrow_and_update().clone();
            if current.is_some() || !self.plan.requires_identity() {
                return ControlFlow::Continue(current);
            }

            self.set_state(SessionState::Idle);
            tracing::debug!(stream = self.stream, "waiting for identity");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return ControlFlow::Break(()),
                changed = self.identity.changed(), if self.identity_open => {
                    if changed.is_err() {
                        // Provider gone: only cancellation can end the wait now.
                        self.identity_open = false;
                    }
                }
            }
        }
    }

    async fn drive(&mut self, connection: Connection, mut identity: Option<Identity>) -> Exit {
        let Connection { link, mut events } = connection;
        let cancel = self.cancel.clone();

        if cancel.is_cancelled() {
            link.close();
            return Exit::Cancelled;
        }

        let mut handles = Vec::new();
        let routes = compute_topics(&self.plan, identity.as_ref());
        self.dispatcher.set_routes(&routes);
        if let Err(err) = self.subscribe_routes(link.as_ref(), &routes, &mut handles) {
            tracing::warn!(stream = self.stream, session = %self.label, error = %err, "subscribe failed");
            self.release(link.as_ref(), handles);
            return Exit::Closed;
        }

        self.set_state(SessionState::Connected);
        tracing::info!(
            stream = self.stream,
            session = %self.label,
            topics = handles.len(),
            "connected"
        );

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Exit::Cancelled,
                changed = self.identity.changed(), if self.identity_open => {
                    if changed.is_err() {
                        self.identity_open = false;
                        continue;
                    }
                    let next = self.identity.borrow_and_update().clone();
                    if next == identity {
                        continue;
                    }
                    if next.is_none() && self.plan.requires_identity() {
                        tracing::info!(stream = self.stream, session = %self.label, "identity cleared");
                        break Exit::IdentityLost;
                    }
                    if needs_new_connection(&self.plan, identity.as_ref(), next.as_ref()) {
                        tracing::info!(stream = self.stream, session = %self.label, "identity changed, reconnecting");
                        break Exit::Reauthenticate;
                    }
                    if let Err(err) = self.resubscribe(link.as_ref(), &mut handles, next.as_ref()) {
                        tracing::warn!(stream = self.stream, session = %self.label, error = %err, "resubscribe failed");
                        break Exit::Closed;
                    }
                    identity = next;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Message { destination, body, .. }) => {
                        self.dispatcher.on_frame(&destination, &body);
                    }
                    Some(TransportEvent::Error(message)) => {
                        tracing::warn!(stream = self.stream, session = %self.label, error = %message, "broker error");
                        break Exit::Closed;
                    }
                    Some(TransportEvent::Closed(reason)) => {
                        tracing::info!(stream = self.stream, session = %self.label, reason = ?reason, "connection closed");
                        break Exit::Closed;
                    }
                    None => break Exit::Closed,
                },
            }
        };

        self.release(link.as_ref(), handles);
        exit
    }

    /// Swap the subscription set for the one `identity` calls for.
    /// A no-op when the topics are unchanged.
    fn resubscribe(
        &mut self,
        link: &dyn TransportLink,
        handles: &mut Vec<SubscriptionHandle>,
        identity: Option<&Identity>,
    ) -> Result<(), TransportError> {
        let routes = compute_topics(&self.plan, identity);
        let unchanged = routes.len() == handles.len()
            && routes.iter().zip(handles.iter()).all(|(r, h)| *r == h.route);
        if unchanged {
            return Ok(());
        }

        for handle in handles.drain(..) {
            link.unsubscribe(&handle.id)?;
        }
        self.dispatcher.set_routes(&routes);
        self.subscribe_routes(link, &routes, handles)?;

        tracing::info!(
            stream = self.stream,
            session = %self.label,
            topics = handles.len(),
            "resubscribed"
        );
        Ok(())
    }

    fn subscribe_routes(
        &self,
        link: &dyn TransportLink,
        routes: &[TopicRoute],
        handles: &mut Vec<SubscriptionHandle>,
    ) -> Result<(), TransportError> {
        for route in routes {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let id = prefixed_ulid(prefix::SUBSCRIPTION);
            link.subscribe(&id, &route.topic)?;
            tracing::debug!(stream = self.stream, topic = %route.topic, id = %id, "subscribed");
            handles.push(SubscriptionHandle {
                id,
                route: route.clone(),
            });
        }
        Ok(())
    }

    fn release(&mut self, link: &dyn TransportLink, handles: Vec<SubscriptionHandle>) {
        self.dispatcher.clear_routes();
        for handle in handles {
            if let Err(err) = link.unsubscribe(&handle.id) {
                tracing::debug!(topic = %handle.route.topic, error = %err, "unsubscribe skipped");
            }
        }
        link.close();
    }

    /// Publish a state change unless the session has been torn down.
    fn set_state(&self, next: SessionState) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::debug!(stream = self.stream, from = ?*current, to = ?next, "state");
            *current = next;
            true
        });
    }
}

/// True when moving from `current` to `next` invalidates the CONNECT credential
/// or the user the connection was opened for. Dropping to no identity without
/// a credential is handled in place by unsubscribing user topics.
fn needs_new_connection(plan: &TopicPlan, current: Option<&Identity>, next: Option<&Identity>) -> bool {
    let token = |identity: Option<&Identity>| identity.and_then(|i| i.token.clone());
    if token(current) != token(next) {
        return true;
    }
    match (current, next) {
        (_, None) => false,
        (None, Some(_)) => plan.depends_on_identity(),
        (Some(current), Some(next)) => plan.depends_on_identity() && current.user_id != next.user_id,
    }
}

/// Label for one activation, used to correlate log lines.
pub(crate) fn session_label() -> String {
    prefixed_ulid(prefix::SESSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::router::TopicTemplate;

    #[test]
    fn connection_state_mapping() {
        assert_eq!(SessionState::Idle.connection(), ConnectionState::Disconnected);
        assert_eq!(SessionState::Activating.connection(), ConnectionState::Connecting);
        assert_eq!(SessionState::Connected.connection(), ConnectionState::Connected);
        assert_eq!(SessionState::Disconnected.connection(), ConnectionState::Disconnected);
    }

    fn user_plan() -> TopicPlan {
        TopicPlan::user(vec![TopicTemplate::events("/topic/price-alerts/user/{userId}")])
    }

    fn both_plan() -> TopicPlan {
        TopicPlan::both(
            vec![TopicTemplate::events("/topic/signals")],
            vec![TopicTemplate::events("/topic/signals/user/{userId}")],
        )
    }

    #[test]
    fn credential_change_always_reconnects() {
        let a1 = Identity::new("A").with_token("t1");
        let a2 = Identity::new("A").with_token("t2");
        let broadcast = TopicPlan::broadcast(vec![TopicTemplate::events("/topic/signals")]);
        assert!(needs_new_connection(&broadcast, Some(&a1), Some(&a2)));
        assert!(needs_new_connection(&user_plan(), Some(&a1), Some(&a2)));
        assert!(needs_new_connection(&both_plan(), Some(&a1), None));
    }

    #[test]
    fn user_change_reconnects_identity_dependent_streams() {
        let a = Identity::new("A");
        let b = Identity::new("B");
        let broadcast = TopicPlan::broadcast(vec![TopicTemplate::events("/topic/signals")]);
        assert!(needs_new_connection(&user_plan(), Some(&a), Some(&b)));
        assert!(needs_new_connection(&both_plan(), None, Some(&a)));
        assert!(!needs_new_connection(&broadcast, Some(&a), Some(&b)));
        assert!(!needs_new_connection(&both_plan(), Some(&a), None));
    }

    #[test]
    fn session_labels_are_prefixed() {
        assert!(session_label().starts_with("ses_"));
    }
}
