//! The four dashboard feeds.

use std::time::Duration;

use tradewatch_common::topic;

use super::buffer::InsertPolicy;
use super::gate::GatePolicy;
use super::router::{TopicPlan, TopicTemplate};
use super::StreamSpec;

/// Market signals: global feed plus the user's tracked-stock signals.
pub fn signals(capacity: usize) -> StreamSpec {
    StreamSpec {
        name: "signals",
        topics: TopicPlan::both(
            vec![
                TopicTemplate::events(topic::SIGNALS),
                TopicTemplate::clear(topic::SIGNALS_CLEAR),
            ],
            vec![
                TopicTemplate::events(topic::USER_SIGNALS),
                TopicTemplate::clear(topic::USER_SIGNALS_CLEAR),
            ],
        ),
        capacity,
        insert_policy: InsertPolicy::Prepend,
        gate: Some(GatePolicy::TagReplace),
    }
}

pub fn tracked_notifications(capacity: usize) -> StreamSpec {
    StreamSpec {
        name: "tracked-notifications",
        topics: TopicPlan::broadcast(vec![TopicTemplate::events(topic::TRACKED_NOTIFICATIONS)]),
        capacity,
        insert_policy: InsertPolicy::Prepend,
        gate: Some(GatePolicy::TagReplace),
    }
}

/// Triggered price alerts, surfaced at most once per `interval` per alert.
pub fn price_alerts(capacity: usize, interval: Duration) -> StreamSpec {
    StreamSpec {
        name: "price-alerts",
        topics: TopicPlan::user(vec![TopicTemplate::events(topic::USER_PRICE_ALERTS)]),
        capacity,
        insert_policy: InsertPolicy::Prepend,
        gate: Some(GatePolicy::TimedSuppression { interval }),
    }
}

/// Latest statistics per tracked code. Never notifies.
pub fn tracked_stats(capacity: usize) -> StreamSpec {
    StreamSpec {
        name: "tracked-stats",
        topics: TopicPlan::user(vec![TopicTemplate::events(topic::USER_TRACKED_STATS)]),
        capacity,
        insert_policy: InsertPolicy::ReplaceByKey,
        gate: None,
    }
}
