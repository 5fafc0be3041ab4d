//! Current user identity, as supplied by the host application.
//!
//! Streams only ever read it through a `watch::Receiver`; the provider is the
//! single writer.

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    /// Bearer credential sent with CONNECT, if the endpoint wants one.
    pub token: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

pub struct IdentityProvider {
    tx: watch::Sender<Option<Identity>>,
}

impl IdentityProvider {
    pub fn new(initial: Option<Identity>) -> Self {
        let (tx, _) = watch::channel(normalize(initial));
        Self { tx }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    /// Replace the current identity. Returns true if it actually changed.
    ///
    /// A blank user id is treated as "no identity".
    pub fn set(&self, identity: Option<Identity>) -> bool {
        let identity = normalize(identity);
        self.tx.send_if_modified(move |current| {
            if *current == identity {
                false
            } else {
                *current = identity;
                true
            }
        })
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}

fn normalize(identity: Option<Identity>) -> Option<Identity> {
    identity.filter(|i| !i.user_id.trim().is_empty())
}
