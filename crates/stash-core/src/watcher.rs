//! Session watcher: keeps one screen's mirror in step with the signed-in user.
//!
//! Mounting subscribes to the [`SessionFeed`]; every transition to a session
//! triggers a full scoped reload, every transition to no session clears the
//! mirror and routes back to the entry screen. Unmounting releases the
//! subscription. Loads already started keep running to completion.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::alert::{Alert, UserAction};
use crate::auth::SessionFeed;
use crate::error::Result;

/// Something whose contents are scoped to the signed-in user.
#[async_trait]
pub trait SessionBound: Send + Sync {
    fn name(&self) -> &str;

    /// Replaces local contents with `user_id`'s records and returns the
    /// count, or `None` when the load was overtaken by a session change.
    async fn load_for(&self, user_id: &str) -> Result<Option<usize>>;

    fn clear(&self);
}

/// Navigation targets a watcher can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Sign-in / sign-up screen.
    Entry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEvent {
    Loaded { user_id: String, count: usize },
    LoadFailed { user_id: String, alert: Alert },
    Cleared,
    Navigate(Route),
}

/// A mounted watcher. Dropping it unmounts.
pub struct SessionWatcher {
    listener: JoinHandle<()>,
}

impl SessionWatcher {
    /// Subscribes `target` to `feed` and returns the watcher plus its events.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn mount(
        feed: &SessionFeed,
        target: Arc<dyn SessionBound>,
    ) -> (Self, mpsc::UnboundedReceiver<WatcherEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut subscription = feed.subscribe();

        let listener = tokio::spawn(async move {
            while let Some(session) = subscription.changed().await {
                match session {
                    Some(session) => {
                        let user_id = session.user.id.clone();
                        tracing::info!("User logged in: {}", user_id);
                        // Detached so unmounting never aborts a request in flight.
                        tokio::spawn(load_target(
                            Arc::clone(&target),
                            user_id,
                            events_tx.clone(),
                        ));
                    }
                    None => {
                        tracing::info!("No user logged in");
                        target.clear();
                        let _ = events_tx.send(WatcherEvent::Cleared);
                        let _ = events_tx.send(WatcherEvent::Navigate(Route::Entry));
                    }
                }
            }
            tracing::debug!("Session feed closed; watcher for {} stopped", target.name());
        });

        (Self { listener }, events_rx)
    }

    /// Releases the session subscription.
    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn load_target(
    target: Arc<dyn SessionBound>,
    user_id: String,
    events: mpsc::UnboundedSender<WatcherEvent>,
) {
    let event = match target.load_for(&user_id).await {
        Ok(Some(count)) => WatcherEvent::Loaded { user_id, count },
        Ok(None) => {
            tracing::debug!("Load of {} for {} superseded", target.name(), user_id);
            return;
        }
        Err(error) => {
            tracing::error!("Error loading {} for {}: {}", target.name(), user_id, error);
            WatcherEvent::LoadFailed {
                user_id,
                alert: Alert::for_error(UserAction::Load, &error),
            }
        }
    };
    if events.send(event).is_err() {
        tracing::debug!("Watcher event dropped; screen already unmounted");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::auth::testing::session_for;
    use crate::mirror::{CollectionMirror, MirrorPolicy};
    use crate::models::Task;
    use crate::store::{MemoryDocumentStore, StoreOp};

    fn seed(store: &MemoryDocumentStore, id: &str, owner: &str, created_at: i64) {
        store.seed(
            "todos",
            id,
            json!({"task": id, "completed": false, "user_id": owner, "created_at": created_at})
                .as_object()
                .cloned()
                .unwrap(),
        );
    }

    fn seeded_store() -> Arc<MemoryDocumentStore> {
        let store = Arc::new(MemoryDocumentStore::new());
        for (id, owner, created_at) in [("t1", "u", 1), ("t2", "u", 2), ("v1", "v", 3)] {
            seed(&store, id, owner, created_at);
        }
        store
    }

    fn task_ids(mirror: &CollectionMirror<Task, MemoryDocumentStore>) -> Vec<String> {
        mirror.records().into_iter().map(|task| task.id).collect()
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<WatcherEvent>) -> WatcherEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("watcher event")
            .expect("channel open")
    }

    #[tokio::test]
    async fn sign_in_loads_exactly_the_users_records_newest_first() {
        let store = seeded_store();
        let mirror = Arc::new(CollectionMirror::<Task, _>::new(
            store,
            MirrorPolicy::ApplyOnAck,
        ));
        let feed = SessionFeed::new();
        let (_watcher, mut events) = SessionWatcher::mount(&feed, mirror.clone());

        // Initial state: nobody signed in.
        assert_eq!(next_event(&mut events).await, WatcherEvent::Cleared);
        assert_eq!(
            next_event(&mut events).await,
            WatcherEvent::Navigate(Route::Entry)
        );

        feed.publish(Some(session_for("u")));
        assert_eq!(
            next_event(&mut events).await,
            WatcherEvent::Loaded {
                user_id: "u".to_string(),
                count: 2
            }
        );
        assert_eq!(task_ids(&mirror), vec!["t2", "t1"]);
    }

    #[tokio::test]
    async fn token_refresh_for_same_user_reloads_from_store() {
        let store = seeded_store();
        let mirror = Arc::new(CollectionMirror::<Task, _>::new(
            Arc::clone(&store),
            MirrorPolicy::ApplyOnAck,
        ));
        let feed = SessionFeed::new();
        feed.publish(Some(session_for("u")));
        let (_watcher, mut events) = SessionWatcher::mount(&feed, mirror.clone());
        assert_eq!(
            next_event(&mut events).await,
            WatcherEvent::Loaded {
                user_id: "u".to_string(),
                count: 2
            }
        );

        seed(&store, "t3", "u", 4);
        feed.publish(Some(session_for("u")));
        assert_eq!(
            next_event(&mut events).await,
            WatcherEvent::Loaded {
                user_id: "u".to_string(),
                count: 3
            }
        );
        assert_eq!(task_ids(&mirror), vec!["t3", "t2", "t1"]);
    }

    #[tokio::test]
    async fn load_overtaken_by_sign_out_reports_nothing() {
        let store = seeded_store();
        let mirror = Arc::new(CollectionMirror::<Task, _>::new(
            Arc::clone(&store),
            MirrorPolicy::ApplyOnAck,
        ));
        let feed = SessionFeed::new();
        feed.publish(Some(session_for("u")));
        let mut hold = store.hold_next_query();
        let (_watcher, mut events) = SessionWatcher::mount(&feed, mirror.clone());

        hold.snapshot_taken().await;
        feed.publish(None);
        assert_eq!(next_event(&mut events).await, WatcherEvent::Cleared);
        assert_eq!(
            next_event(&mut events).await,
            WatcherEvent::Navigate(Route::Entry)
        );
        hold.release();

        // A later session proves the channel is still live and nothing
        // from the overtaken load was queued in between.
        feed.publish(Some(session_for("v")));
        assert_eq!(
            next_event(&mut events).await,
            WatcherEvent::Loaded {
                user_id: "v".to_string(),
                count: 1
            }
        );
        assert_eq!(task_ids(&mirror), vec!["v1"]);
    }

    #[tokio::test]
    async fn sign_out_clears_records_and_routes_to_entry() {
        let mirror = Arc::new(CollectionMirror::<Task, _>::new(
            seeded_store(),
            MirrorPolicy::ApplyOnAck,
        ));
        let feed = SessionFeed::new();
        feed.publish(Some(session_for("u")));
        let (_watcher, mut events) = SessionWatcher::mount(&feed, mirror.clone());
        assert!(matches!(
            next_event(&mut events).await,
            WatcherEvent::Loaded { .. }
        ));

        feed.publish(None);
        assert_eq!(next_event(&mut events).await, WatcherEvent::Cleared);
        assert_eq!(
            next_event(&mut events).await,
            WatcherEvent::Navigate(Route::Entry)
        );
        assert!(mirror.is_empty());
        assert!(mirror.owner().is_none());
    }

    #[tokio::test]
    async fn load_failure_is_reported_not_swallowed() {
        let store = seeded_store();
        store.fail_next(StoreOp::Query, "offline");
        let mirror = Arc::new(CollectionMirror::<Task, _>::new(
            store,
            MirrorPolicy::ApplyOnAck,
        ));
        let feed = SessionFeed::new();
        feed.publish(Some(session_for("u")));
        let (_watcher, mut events) = SessionWatcher::mount(&feed, mirror);

        match next_event(&mut events).await {
            WatcherEvent::LoadFailed { user_id, alert } => {
                assert_eq!(user_id, "u");
                assert_eq!(alert.title, "Load Failed");
            }
            other => panic!("expected load failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmount_releases_subscription() {
        let mirror = Arc::new(CollectionMirror::<Task, _>::new(
            seeded_store(),
            MirrorPolicy::ApplyOnAck,
        ));
        let feed = SessionFeed::new();
        let (watcher, _events) = SessionWatcher::mount(&feed, mirror.clone());
        assert_eq!(feed.subscriber_count(), 1);

        watcher.unmount();
        for _ in 0..50 {
            if feed.subscriber_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(feed.subscriber_count(), 0);

        feed.publish(Some(session_for("u")));
        tokio::task::yield_now().await;
        assert!(mirror.is_empty());
    }
}
