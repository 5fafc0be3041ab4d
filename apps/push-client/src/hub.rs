use std::sync::Arc;

use crate::config::Config;
use crate::identity::IdentityProvider;
use crate::notify::Notifier;
use crate::stream::catalog;
use crate::stream::events::{PriceAlertNotification, Signal, StatsUpdate, TrackedNotification};
use crate::stream::{PushStream, SessionState};
use crate::transport::{Connector, StompConnector};

/// Owns the four dashboard streams.
///
/// Each stream gets its own connection through the shared connector, so a
/// stalled feed never holds up another.
pub struct NotificationHub {
    pub signals: PushStream<Signal>,
    pub tracked: PushStream<TrackedNotification>,
    pub price_alerts: PushStream<PriceAlertNotification>,
    pub stats: PushStream<StatsUpdate>,
}

impl NotificationHub {
    pub fn new(
        config: &Config,
        connector: Arc<dyn Connector>,
        identity: &IdentityProvider,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        let settings = config.session_settings();
        let style = config.notification_style();

        let signals = PushStream::new(
            catalog::signals(config.signal_capacity),
            settings,
            Arc::clone(&connector),
            identity.subscribe(),
        );
        let tracked = PushStream::new(
            catalog::tracked_notifications(config.tracked_capacity),
            settings,
            Arc::clone(&connector),
            identity.subscribe(),
        );
        let price_alerts = PushStream::new(
            catalog::price_alerts(config.price_alert_capacity, config.price_alert_interval),
            settings,
            Arc::clone(&connector),
            identity.subscribe(),
        );
        let stats = PushStream::new(
            catalog::tracked_stats(config.stats_capacity),
            settings,
            connector,
            identity.subscribe(),
        );

        match notifier {
            Some(notifier) => Self {
                signals: signals.with_notifier(Arc::clone(&notifier), style.clone()),
                tracked: tracked.with_notifier(Arc::clone(&notifier), style.clone()),
                price_alerts: price_alerts.with_notifier(Arc::clone(&notifier), style.clone()),
                stats: stats.with_notifier(notifier, style),
            },
            None => Self {
                signals,
                tracked,
                price_alerts,
                stats,
            },
        }
    }

    /// Hub talking STOMP to `config.endpoint_url`.
    pub fn from_config(
        config: &Config,
        identity: &IdentityProvider,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        let connector: Arc<dyn Connector> = Arc::new(StompConnector::new(
            config.endpoint_url.clone(),
            config.heartbeat(),
            config.connect_timeout,
        ));
        Self::new(config, connector, identity, notifier)
    }

    pub fn activate_all(&self) {
        self.signals.activate();
        self.tracked.activate();
        self.price_alerts.activate();
        self.stats.activate();
    }

    pub async fn deactivate_all(&self) {
        tokio::join!(
            self.signals.deactivate(),
            self.tracked.deactivate(),
            self.price_alerts.deactivate(),
            self.stats.deactivate(),
        );
    }

    /// `(stream name, state)` for every stream.
    pub fn statuses(&self) -> [(&'static str, SessionState); 4] {
        [
            (self.signals.name(), self.signals.state()),
            (self.tracked.name(), self.tracked.state()),
            (self.price_alerts.name(), self.price_alerts.state()),
            (self.stats.name(), self.stats.state()),
        ]
    }
}
