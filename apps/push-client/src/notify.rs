//! Desktop notification surface.
//!
//! The OS-level display is an external collaborator. A [`Notifier`] is the
//! capability handed to a stream's gate when notifications are permitted;
//! streams built without one never surface anything.

use std::time::Duration;

use parking_lot::Mutex;

/// A fire-and-forget request to show one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub icon: String,
    /// Notifications sharing a tag replace each other on screen.
    pub tag: String,
    /// Dismissed automatically after this long, whatever the user does.
    pub auto_close_after: Duration,
}

/// Presentation settings shared by every request a gate issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationStyle {
    pub icon: String,
    pub auto_close_after: Duration,
}

impl Default for NotificationStyle {
    fn default() -> Self {
        Self {
            icon: "/favicon.ico".to_string(),
            auto_close_after: Duration::from_secs(10),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, request: NotificationRequest);
}

/// Writes notifications to the log. Used by the `push-client` binary.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, request: NotificationRequest) {
        tracing::info!(
            tag = %request.tag,
            title = %request.title,
            body = %request.body,
            auto_close_ms = request.auto_close_after.as_millis() as u64,
            "desktop notification"
        );
    }
}

/// Keeps every request in memory so callers can inspect or drain them.
#[derive(Default)]
pub struct RecordingNotifier {
    requests: Mutex<Vec<NotificationRequest>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<NotificationRequest> {
        self.requests.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }

    pub fn take(&self) -> Vec<NotificationRequest> {
        std::mem::take(&mut *self.requests.lock())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, request: NotificationRequest) {
        self.requests.lock().push(request);
    }
}
