//! Session-change notifications.
//!
//! One producer (the auth service) publishes every session transition;
//! any number of consumers subscribe and each drops its own subscription.

use std::sync::Arc;

use tokio::sync::watch;

use super::AuthSession;

/// Process-wide observable holding the current session.
#[derive(Clone)]
pub struct SessionFeed {
    sender: Arc<watch::Sender<Option<AuthSession>>>,
}

impl Default for SessionFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFeed {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publishes a transition. Subscribers are notified even when the
    /// session value is unchanged (token refresh for the same user).
    pub fn publish(&self, session: Option<AuthSession>) {
        match &session {
            Some(session) => tracing::debug!("Session acquired for user {}", session.user.id),
            None => tracing::debug!("Session cleared"),
        }
        self.sender.send_replace(session);
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.sender.borrow().clone()
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.sender
            .borrow()
            .as_ref()
            .map(|session| session.user.id.clone())
    }

    /// Registers a consumer. The first `changed()` call resolves
    /// immediately with the state current at subscription time.
    pub fn subscribe(&self) -> SessionSubscription {
        let mut receiver = self.sender.subscribe();
        receiver.mark_changed();
        SessionSubscription { receiver }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription; dropping it unsubscribes.
pub struct SessionSubscription {
    receiver: watch::Receiver<Option<AuthSession>>,
}

impl SessionSubscription {
    /// Waits for the next transition. Returns `None` once the feed is gone.
    pub async fn changed(&mut self) -> Option<Option<AuthSession>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}
