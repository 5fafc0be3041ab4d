//! Typed payloads for each feed, plus the clear control message.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// `action` value of the control message that empties a feed's buffer.
pub const CLEAR_ALL_ACTION: &str = "CLEAR_ALL";

/// An event a push stream can parse, store and notify about.
pub trait FeedEvent: DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    /// Natural identity: buffer key and notification tag.
    fn dedup_key(&self) -> String;

    /// Title and body of a desktop notification about this event.
    fn headline(&self) -> (String, String);
}

/// True for `{"action": "CLEAR_ALL"}` control payloads.
pub fn is_clear_command(payload: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| {
            value
                .get("action")
                .and_then(|action| action.as_str())
                .map(|action| action == CLEAR_ALL_ACTION)
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub code: String,
    pub signal_type: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl FeedEvent for Signal {
    fn dedup_key(&self) -> String {
        self.code.clone()
    }

    fn headline(&self) -> (String, String) {
        let title = format!("{} signal: {}", self.signal_type, self.code);
        let body = match self.price {
            Some(price) => format!("Score {} at {}", self.score, price),
            None => format!("Score {}", self.score),
        };
        (title, body)
    }
}

// ---------------------------------------------------------------------------
// Tracked-stock notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedNotification {
    pub code: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl FeedEvent for TrackedNotification {
    fn dedup_key(&self) -> String {
        self.code.clone()
    }

    fn headline(&self) -> (String, String) {
        let title = match &self.kind {
            Some(kind) => format!("{}: {}", self.code, kind),
            None => format!("Tracked stock {}", self.code),
        };
        let body = match (self.message.is_empty(), self.price) {
            (false, _) => self.message.clone(),
            (true, Some(price)) => format!("Price {}", price),
            (true, None) => String::new(),
        };
        (title, body)
    }
}

// ---------------------------------------------------------------------------
// Price alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlertNotification {
    pub alert_id: i64,
    #[serde(default)]
    pub code: String,
    /// e.g. `ABOVE` / `BELOW`.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub target_price: Option<f64>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub triggered_at: Option<String>,
}

impl FeedEvent for PriceAlertNotification {
    fn dedup_key(&self) -> String {
        self.alert_id.to_string()
    }

    fn headline(&self) -> (String, String) {
        let title = format!("Price alert: {}", self.code);
        if let Some(message) = &self.message {
            return (title, message.clone());
        }
        let body = match (self.current_price, self.target_price) {
            (Some(current), Some(target)) => {
                let condition = self.condition.as_deref().unwrap_or("reached");
                format!("Price {} is {} target {}", current, condition.to_lowercase(), target)
            }
            (Some(current), None) => format!("Price {}", current),
            _ => "Alert triggered".to_string(),
        };
        (title, body)
    }
}

// ---------------------------------------------------------------------------
// Tracked-stock live statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsUpdate {
    pub code: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub change: Option<f64>,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub buy_signals: Option<u32>,
    #[serde(default)]
    pub sell_signals: Option<u32>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl FeedEvent for StatsUpdate {
    fn dedup_key(&self) -> String {
        self.code.clone()
    }

    fn headline(&self) -> (String, String) {
        let body = match (self.price, self.change_percent) {
            (Some(price), Some(pct)) => format!("{} ({:+.2}%)", price, pct),
            (Some(price), None) => price.to_string(),
            _ => String::new(),
        };
        (self.code.clone(), body)
    }
}
