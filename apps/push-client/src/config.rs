use std::time::Duration;

use crate::identity::Identity;
use crate::notify::NotificationStyle;
use crate::stream::SessionSettings;
use crate::transport::HeartBeat;

/// Push client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker endpoint (e.g. `ws://localhost:8080/ws`). Shared by every stream.
    pub endpoint_url: String,
    /// Current user id. User-scoped streams stay idle without it.
    pub user_id: Option<String>,
    /// Bearer credential sent with CONNECT.
    pub auth_token: Option<String>,
    /// Fixed delay between a disconnect and the next connection attempt.
    pub reconnect_delay: Duration,
    pub heartbeat_outgoing: Duration,
    pub heartbeat_incoming: Duration,
    /// Upper bound on socket connect plus STOMP handshake.
    pub connect_timeout: Duration,
    pub signal_capacity: usize,
    pub tracked_capacity: usize,
    pub price_alert_capacity: usize,
    pub stats_capacity: usize,
    /// Minimum gap between two desktop notifications for the same price alert.
    pub price_alert_interval: Duration,
    pub notify_icon: String,
    pub notify_auto_close: Duration,
    /// Whether desktop notifications are permitted at all.
    pub desktop_notifications: bool,
}

impl Config {
    /// Defaults for everything except the endpoint.
    pub fn with_endpoint(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            user_id: None,
            auth_token: None,
            reconnect_delay: Duration::from_millis(5000),
            heartbeat_outgoing: Duration::from_millis(4000),
            heartbeat_incoming: Duration::from_millis(4000),
            connect_timeout: Duration::from_millis(10_000),
            signal_capacity: 20,
            tracked_capacity: 15,
            price_alert_capacity: 20,
            stats_capacity: 20,
            price_alert_interval: Duration::from_secs(5 * 60),
            notify_icon: "/favicon.ico".to_string(),
            notify_auto_close: Duration::from_millis(10_000),
            desktop_notifications: true,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        let defaults = Self::with_endpoint(required_var("PUSH_WS_URL"));
        Self {
            user_id: optional_var("PUSH_USER_ID"),
            auth_token: optional_var("PUSH_AUTH_TOKEN"),
            reconnect_delay: millis_var("PUSH_RECONNECT_DELAY_MS", defaults.reconnect_delay),
            heartbeat_outgoing: millis_var("PUSH_HEARTBEAT_OUTGOING_MS", defaults.heartbeat_outgoing),
            heartbeat_incoming: millis_var("PUSH_HEARTBEAT_INCOMING_MS", defaults.heartbeat_incoming),
            connect_timeout: millis_var("PUSH_CONNECT_TIMEOUT_MS", defaults.connect_timeout),
            signal_capacity: parsed_var("PUSH_SIGNAL_CAPACITY", defaults.signal_capacity),
            tracked_capacity: parsed_var("PUSH_TRACKED_CAPACITY", defaults.tracked_capacity),
            price_alert_capacity: parsed_var("PUSH_PRICE_ALERT_CAPACITY", defaults.price_alert_capacity),
            stats_capacity: parsed_var("PUSH_STATS_CAPACITY", defaults.stats_capacity),
            price_alert_interval: Duration::from_secs(parsed_var(
                "PUSH_PRICE_ALERT_INTERVAL_SECS",
                defaults.price_alert_interval.as_secs(),
            )),
            notify_icon: optional_var("PUSH_NOTIFY_ICON").unwrap_or(defaults.notify_icon.clone()),
            notify_auto_close: millis_var("PUSH_NOTIFY_AUTO_CLOSE_MS", defaults.notify_auto_close),
            desktop_notifications: parsed_var("PUSH_DESKTOP_NOTIFICATIONS", defaults.desktop_notifications),
            ..defaults
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        let identity = Identity::new(self.user_id.clone()?);
        Some(match &self.auth_token {
            Some(token) => identity.with_token(token.clone()),
            None => identity,
        })
    }

    pub fn heartbeat(&self) -> HeartBeat {
        HeartBeat::new(self.heartbeat_outgoing, self.heartbeat_incoming)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            reconnect_delay: self.reconnect_delay,
        }
    }

    pub fn notification_style(&self) -> NotificationStyle {
        NotificationStyle {
            icon: self.notify_icon.clone(),
            auto_close_after: self.notify_auto_close,
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn millis_var(name: &str, default: Duration) -> Duration {
    Duration::from_millis(parsed_var(name, default.as_millis() as u64))
}
