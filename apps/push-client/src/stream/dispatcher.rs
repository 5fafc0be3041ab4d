//! Turns raw frames into buffer inserts and gate checks.
//!
//! Dispatch is synchronous: a frame is parsed, stored and offered to the gate
//! before the next frame is looked at.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;

use super::buffer::NotificationBuffer;
use super::events::{is_clear_command, FeedEvent};
use super::gate::NotificationGate;
use super::router::{RouteKind, TopicRoute};

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Buffered, no notification.
    Stored,
    /// Buffered and surfaced as a notification.
    Notified,
    /// Buffer emptied.
    Cleared,
    /// Payload did not parse; dropped.
    Malformed,
    /// Topic has no route; dropped.
    Unrouted,
}

pub struct Dispatcher<E: FeedEvent> {
    stream: &'static str,
    routes: HashMap<String, RouteKind>,
    buffer: Arc<NotificationBuffer<E>>,
    gate: Option<Arc<NotificationGate>>,
}

impl<E: FeedEvent> Dispatcher<E> {
    pub fn new(
        stream: &'static str,
        buffer: Arc<NotificationBuffer<E>>,
        gate: Option<Arc<NotificationGate>>,
    ) -> Self {
        Self {
            stream,
            routes: HashMap::new(),
            buffer,
            gate,
        }
    }

    /// Replace the route table wholesale.
    pub fn set_routes(&mut self, routes: &[TopicRoute]) {
        self.routes = routes.iter().map(|r| (r.topic.clone(), r.kind)).collect();
    }

    pub fn clear_routes(&mut self) {
        self.routes.clear();
    }

    pub fn on_frame(&self, topic: &str, payload: &str) -> Dispatched {
        self.on_frame_at(topic, payload, Instant::now())
    }

    pub fn on_frame_at(&self, topic: &str, payload: &str, now: Instant) -> Dispatched {
        let Some(kind) = self.routes.get(topic) else {
            tracing::debug!(stream = self.stream, topic = %topic, "frame on unrouted topic dropped");
            return Dispatched::Unrouted;
        };

        if *kind == RouteKind::Clear || is_clear_command(payload) {
            self.buffer.clear();
            tracing::info!(stream = self.stream, topic = %topic, "buffer cleared");
            return Dispatched::Cleared;
        }

        let event: E = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    stream = self.stream,
                    topic = %topic,
                    error = %err,
                    "malformed payload dropped"
                );
                return Dispatched::Malformed;
            }
        };

        self.buffer.insert(event.clone());

        match &self.gate {
            Some(gate) if gate.offer(&event, now) => Dispatched::Notified,
            _ => Dispatched::Stored,
        }
    }
}
