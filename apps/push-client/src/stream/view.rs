//! Read-only handles given to consumers (tables, badges, status indicators).
//!
//! A view can observe a stream but has no way to mutate it.

use std::sync::Arc;

use tokio::sync::watch;

use super::buffer::{BufferEntry, Snapshot};
use super::session::{ConnectionState, SessionState};

/// Observes a stream's notification buffer.
#[derive(Clone)]
pub struct BufferView<E> {
    rx: watch::Receiver<Snapshot<E>>,
}

impl<E> BufferView<E> {
    pub(crate) fn new(rx: watch::Receiver<Snapshot<E>>) -> Self {
        Self { rx }
    }

    pub fn snapshot(&self) -> Snapshot<E> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next change and return the new snapshot.
    /// Returns `None` once the owning stream is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<E>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }

    /// Wait until the buffer satisfies `pred`, checking the current value first.
    pub async fn wait_for(&mut self, mut pred: impl FnMut(&[BufferEntry<E>]) -> bool) -> Option<Snapshot<E>> {
        let snapshot = self.rx.wait_for(|s| pred(s.as_slice())).await.ok()?;
        Some(Arc::clone(&snapshot))
    }
}

/// Observes a stream's lifecycle state.
#[derive(Clone)]
pub struct StatusView {
    rx: watch::Receiver<SessionState>,
}

impl StatusView {
    pub(crate) fn new(rx: watch::Receiver<SessionState>) -> Self {
        Self { rx }
    }

    pub fn current(&self) -> SessionState {
        *self.rx.borrow()
    }

    /// The coarse `disconnected | connecting | connected` indicator.
    pub fn connection(&self) -> ConnectionState {
        self.current().connection()
    }

    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub async fn wait_for(&mut self, target: SessionState) -> Option<SessionState> {
        self.rx.wait_for(|s| *s == target).await.ok().map(|s| *s)
    }
}
