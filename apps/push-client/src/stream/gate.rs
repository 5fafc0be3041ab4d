//! Decides whether an event surfaces as a desktop notification.
//!
//! Storing an event in the buffer never depends on this gate.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::notify::{NotificationRequest, NotificationStyle, Notifier};

use super::events::FeedEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePolicy {
    /// Always notify; the notification surface replaces older ones sharing the tag.
    TagReplace,
    /// At most one notification per key within `interval`.
    TimedSuppression { interval: Duration },
}

pub struct NotificationGate {
    policy: GatePolicy,
    /// Key -> when it was last surfaced. Only filled under timed suppression.
    processed: DashMap<String, Instant>,
    notifier: Arc<dyn Notifier>,
    style: NotificationStyle,
}

impl NotificationGate {
    pub fn new(policy: GatePolicy, notifier: Arc<dyn Notifier>, style: NotificationStyle) -> Self {
        Self {
            policy,
            processed: DashMap::new(),
            notifier,
            style,
        }
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    /// Returns true if `key` may be surfaced at `now`, recording it if so.
    pub fn should_notify(&self, key: &str, now: Instant) -> bool {
        match self.policy {
            // Nothing to remember: the surface dedups by tag.
            GatePolicy::TagReplace => true,
            GatePolicy::TimedSuppression { interval } => {
                self.processed
                    .retain(|_, seen| now.saturating_duration_since(*seen) < interval);
                if self.processed.contains_key(key) {
                    return false;
                }
                self.processed.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Run `event` through the gate and issue a notification request if it passes.
    pub fn offer<E: FeedEvent>(&self, event: &E, now: Instant) -> bool {
        let key = event.dedup_key();
        if !self.should_notify(&key, now) {
            tracing::debug!(key = %key, "notification suppressed");
            return false;
        }

        let (title, body) = event.headline();
        self.notifier.notify(NotificationRequest {
            title,
            body,
            icon: self.style.icon.clone(),
            tag: key,
            auto_close_after: self.style.auto_close_after,
        });
        true
    }

    /// Forget every processed key.
    pub fn reset(&self) {
        self.processed.clear();
    }

    pub fn tracked_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.processed.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::stream::events::PriceAlertNotification;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    fn gate(policy: GatePolicy) -> (NotificationGate, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let gate = NotificationGate::new(policy, notifier.clone(), NotificationStyle::default());
        (gate, notifier)
    }

    fn alert(id: i64) -> PriceAlertNotification {
        PriceAlertNotification {
            alert_id: id,
            code: "VNM".to_string(),
            condition: Some("ABOVE".to_string()),
            target_price: Some(70.0),
            current_price: Some(71.0),
            message: None,
            triggered_at: None,
        }
    }

    #[test]
    fn timed_suppression_boundaries() {
        let (gate, _) = gate(GatePolicy::TimedSuppression { interval: FIVE_MINUTES });
        let t0 = Instant::now();

        assert!(gate.should_notify("K", t0));
        assert!(!gate.should_notify("K", t0 + Duration::from_secs(120)));
        assert!(!gate.should_notify("K", t0 + FIVE_MINUTES - Duration::from_millis(1)));
        assert!(gate.should_notify("K", t0 + FIVE_MINUTES));
    }

    #[test]
    fn timed_suppression_is_per_key() {
        let (gate, _) = gate(GatePolicy::TimedSuppression { interval: FIVE_MINUTES });
        let t0 = Instant::now();
        assert!(gate.should_notify("1", t0));
        assert!(gate.should_notify("2", t0));
        assert_eq!(gate.tracked_keys(), vec!["1", "2"]);
    }

    #[test]
    fn expired_keys_age_out() {
        let (gate, _) = gate(GatePolicy::TimedSuppression { interval: FIVE_MINUTES });
        let t0 = Instant::now();
        gate.should_notify("old", t0);
        gate.should_notify("new", t0 + Duration::from_secs(400));
        assert_eq!(gate.tracked_keys(), vec!["new"]);
    }

    #[test]
    fn tag_replace_always_passes() {
        let (gate, _) = gate(GatePolicy::TagReplace);
        let t0 = Instant::now();
        assert!(gate.should_notify("FPT", t0));
        assert!(gate.should_notify("FPT", t0));
        for i in 0..100 {
            assert!(gate.should_notify(&format!("CODE{i}"), t0));
        }
        assert!(gate.tracked_keys().is_empty());
    }

    #[test]
    fn offer_builds_request_from_event_and_style() {
        let (gate, notifier) = gate(GatePolicy::TimedSuppression { interval: FIVE_MINUTES });
        let t0 = Instant::now();

        assert!(gate.offer(&alert(1), t0));
        assert!(!gate.offer(&alert(1), t0 + Duration::from_secs(120)));
        assert!(gate.offer(&alert(1), t0 + Duration::from_secs(400)));

        let requests = notifier.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tag, "1");
        assert_eq!(requests[0].title, "Price alert: VNM");
        assert_eq!(requests[0].icon, "/favicon.ico");
        assert_eq!(requests[0].auto_close_after, Duration::from_secs(10));
    }

    #[test]
    fn reset_forgets_keys() {
        let (gate, _) = gate(GatePolicy::TimedSuppression { interval: FIVE_MINUTES });
        let t0 = Instant::now();
        gate.should_notify("K", t0);
        gate.reset();
        assert!(gate.should_notify("K", t0));
    }
}
