//! Security lifecycle events.
//!
//! Observers are called synchronously, in registration order, on the task
//! handling the request. Authorization failures are also published on a
//! broadcast channel so audit sinks can consume them without holding up the
//! response.

use std::sync::Arc;

use futures::Stream;
use futures::stream;
use tokio::sync::broadcast;
use warden_security::{RequestId, SecurityIdentity};

/// Default capacity of the authorization failure channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Prefix of the check name reported for HTTP permission policies.
pub const HTTP_POLICY_CHECK_PREFIX: &str = "HttpSecurityPolicy:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityEventKind {
    AuthenticationSuccess,
    AuthenticationFailure,
    AuthorizationSuccess,
    AuthorizationFailure,
}

/// One security lifecycle event.
///
/// Every event carries the id of the request it belongs to; authorization
/// events also name the check, e.g. `OrderResource#get` or
/// `HttpSecurityPolicy:roles1`.
#[derive(Debug, Clone)]
pub enum SecurityEvent {
    AuthenticationSuccess {
        request_id: RequestId,
        identity: SecurityIdentity,
        mechanism: String,
    },
    AuthenticationFailure {
        request_id: RequestId,
        mechanism: Option<String>,
        error: String,
    },
    AuthorizationSuccess {
        request_id: RequestId,
        identity: SecurityIdentity,
        check: String,
    },
    AuthorizationFailure {
        request_id: RequestId,
        identity: Option<SecurityIdentity>,
        check: String,
        error: String,
    },
}

impl SecurityEvent {
    #[must_use]
    pub fn kind(&self) -> SecurityEventKind {
        match self {
            Self::AuthenticationSuccess { .. } => SecurityEventKind::AuthenticationSuccess,
            Self::AuthenticationFailure { .. } => SecurityEventKind::AuthenticationFailure,
            Self::AuthorizationSuccess { .. } => SecurityEventKind::AuthorizationSuccess,
            Self::AuthorizationFailure { .. } => SecurityEventKind::AuthorizationFailure,
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::AuthenticationSuccess { request_id, .. }
            | Self::AuthenticationFailure { request_id, .. }
            | Self::AuthorizationSuccess { request_id, .. }
            | Self::AuthorizationFailure { request_id, .. } => *request_id,
        }
    }

    /// Identity the event refers to; `None` before authentication succeeded.
    #[must_use]
    pub fn identity(&self) -> Option<&SecurityIdentity> {
        match self {
            Self::AuthenticationSuccess { identity, .. }
            | Self::AuthorizationSuccess { identity, .. } => Some(identity),
            Self::AuthorizationFailure { identity, .. } => identity.as_ref(),
            Self::AuthenticationFailure { .. } => None,
        }
    }

    /// Name of the authorization check.
    #[must_use]
    pub fn check(&self) -> Option<&str> {
        match self {
            Self::AuthorizationSuccess { check, .. } | Self::AuthorizationFailure { check, .. } => {
                Some(check)
            }
            Self::AuthenticationSuccess { .. } | Self::AuthenticationFailure { .. } => None,
        }
    }
}

/// Synchronous event subscriber.
pub trait SecurityEventObserver: Send + Sync {
    fn observe(&self, event: &SecurityEvent);
}

/// Delivers events to observers.
#[derive(Clone)]
pub struct EventBus {
    observers: Vec<Arc<dyn SecurityEventObserver>>,
    failures: Arc<broadcast::Sender<SecurityEvent>>,
}

impl EventBus {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn SecurityEventObserver>>) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            observers,
            failures: Arc::new(sender),
        }
    }

    pub fn fire(&self, event: &SecurityEvent) {
        for observer in &self.observers {
            observer.observe(event);
        }
        if event.kind() == SecurityEventKind::AuthorizationFailure {
            match self.failures.send(event.clone()) {
                Ok(count) => tracing::trace!(subscribers = count, "authorization failure published"),
                Err(_) => tracing::trace!("authorization failure published without subscribers"),
            }
        }
    }

    /// Stream of authorization failures fired after this call.
    pub fn subscribe_authorization_failures(&self) -> impl Stream<Item = SecurityEvent> + Send + use<> {
        stream::unfold(self.failures.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "authorization failure stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .field("failure_subscribers", &self.failures.receiver_count())
            .finish()
    }
}
