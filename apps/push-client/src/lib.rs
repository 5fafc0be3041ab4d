pub mod config;
pub mod error;
pub mod hub;
pub mod identity;
pub mod notify;
pub mod stream;
pub mod transport;

pub use config::Config;
pub use error::{FrameError, TransportError};
pub use hub::NotificationHub;
pub use identity::{Identity, IdentityProvider};
pub use notify::{LogNotifier, NotificationRequest, NotificationStyle, Notifier, RecordingNotifier};
pub use stream::{PushStream, SessionState, StreamSpec};
pub use transport::{Connector, MemoryBroker, StompConnector};
