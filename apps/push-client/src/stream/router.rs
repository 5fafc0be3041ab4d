//! Topic routing: which destinations a stream listens on for a given identity.

use tradewatch_common::topic;

use crate::identity::Identity;

/// Which half of a stream's topic catalog is in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Global topics only. Identity is ignored.
    Broadcast,
    /// Per-user topics only. Nothing is subscribed without an identity.
    User,
    /// Global topics always, per-user topics when an identity is known.
    Both,
}

/// What a frame on a topic means to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Payloads are feed events.
    Events,
    /// Any payload empties the buffer.
    Clear,
}

/// A destination template and how its frames are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicTemplate {
    pub pattern: &'static str,
    pub kind: RouteKind,
}

impl TopicTemplate {
    pub const fn events(pattern: &'static str) -> Self {
        Self {
            pattern,
            kind: RouteKind::Events,
        }
    }

    pub const fn clear(pattern: &'static str) -> Self {
        Self {
            pattern,
            kind: RouteKind::Clear,
        }
    }
}

/// A concrete destination the session subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRoute {
    pub topic: String,
    pub kind: RouteKind,
}

/// A stream's declared scope together with its topic templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPlan {
    pub scope: Scope,
    pub broadcast: Vec<TopicTemplate>,
    pub user: Vec<TopicTemplate>,
}

impl TopicPlan {
    pub fn broadcast(templates: Vec<TopicTemplate>) -> Self {
        Self {
            scope: Scope::Broadcast,
            broadcast: templates,
            user: Vec::new(),
        }
    }

    pub fn user(templates: Vec<TopicTemplate>) -> Self {
        Self {
            scope: Scope::User,
            broadcast: Vec::new(),
            user: templates,
        }
    }

    pub fn both(broadcast: Vec<TopicTemplate>, user: Vec<TopicTemplate>) -> Self {
        Self {
            scope: Scope::Both,
            broadcast,
            user,
        }
    }

    /// The stream must not open a connection without an identity.
    pub fn requires_identity(&self) -> bool {
        self.scope == Scope::User
    }

    /// The topic set changes when the identity does.
    pub fn depends_on_identity(&self) -> bool {
        self.scope != Scope::Broadcast
    }
}

/// Ordered destinations for `plan` under `identity`.
///
/// Broadcast topics come first, then user topics. User topics are omitted
/// entirely when no identity is known.
pub fn compute_topics(plan: &TopicPlan, identity: Option<&Identity>) -> Vec<TopicRoute> {
    let mut routes = Vec::new();

    if matches!(plan.scope, Scope::Broadcast | Scope::Both) {
        routes.extend(plan.broadcast.iter().map(|t| TopicRoute {
            topic: t.pattern.to_string(),
            kind: t.kind,
        }));
    }

    if matches!(plan.scope, Scope::User | Scope::Both) {
        if let Some(identity) = identity {
            routes.extend(plan.user.iter().map(|t| TopicRoute {
                topic: topic::render(t.pattern, &identity.user_id),
                kind: t.kind,
            }));
        }
    }

    routes
}
