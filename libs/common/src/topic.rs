//! Broker destination names.
//!
//! These strings are a wire contract with the server and must not change.
//! User-scoped destinations carry a `{userId}` placeholder that is filled in
//! with [`render`].

/// Placeholder substituted with the current user's id.
pub const USER_ID_PLACEHOLDER: &str = "{userId}";

pub const SIGNALS: &str = "/topic/signals";
pub const SIGNALS_CLEAR: &str = "/topic/signals/clear";
pub const USER_SIGNALS: &str = "/topic/signals/user/{userId}";
pub const USER_SIGNALS_CLEAR: &str = "/topic/signals/user/{userId}/clear";
pub const TRACKED_NOTIFICATIONS: &str = "/topic/tracked-notifications";
pub const USER_PRICE_ALERTS: &str = "/topic/price-alerts/user/{userId}";
pub const USER_TRACKED_STATS: &str = "/topic/tracked-stocks-stats/user/{userId}";

/// Fill the `{userId}` placeholder of a destination template.
pub fn render(template: &str, user_id: &str) -> String {
    template.replace(USER_ID_PLACEHOLDER, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_user_destinations() {
        assert_eq!(render(USER_SIGNALS, "42"), "/topic/signals/user/42");
        assert_eq!(render(USER_SIGNALS_CLEAR, "42"), "/topic/signals/user/42/clear");
        assert_eq!(render(USER_PRICE_ALERTS, "7"), "/topic/price-alerts/user/7");
        assert_eq!(
            render(USER_TRACKED_STATS, "7"),
            "/topic/tracked-stocks-stats/user/7"
        );
    }

    #[test]
    fn broadcast_destinations_are_left_alone() {
        assert_eq!(render(SIGNALS, "42"), SIGNALS);
        assert_eq!(render(TRACKED_NOTIFICATIONS, "42"), TRACKED_NOTIFICATIONS);
    }
}
