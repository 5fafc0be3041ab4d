use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use push_client::notify::{LogNotifier, Notifier};
use push_client::stream::StatusView;
use push_client::{Config, IdentityProvider, NotificationHub};

#[tokio::main]
async fn main() {
    // Load .env if present; variables may also come from the environment.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        endpoint = %config.endpoint_url,
        user_id = ?config.user_id,
        notifications = config.desktop_notifications,
        "push-client configured"
    );

    let identity = IdentityProvider::new(config.identity());
    let notifier: Option<Arc<dyn Notifier>> = if config.desktop_notifications {
        Some(Arc::new(LogNotifier))
    } else {
        None
    };

    let hub = NotificationHub::from_config(&config, &identity, notifier);

    for (name, status) in [
        (hub.signals.name(), hub.signals.status()),
        (hub.tracked.name(), hub.tracked.status()),
        (hub.price_alerts.name(), hub.price_alerts.status()),
        (hub.stats.name(), hub.stats.status()),
    ] {
        tokio::spawn(log_status(name, status));
    }

    hub.activate_all();

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }

    tracing::info!("shutting down");
    hub.deactivate_all().await;
}

async fn log_status(stream: &'static str, mut status: StatusView) {
    while let Some(state) = status.changed().await {
        tracing::info!(stream, state = ?state, connection = ?state.connection(), "status");
    }
}
