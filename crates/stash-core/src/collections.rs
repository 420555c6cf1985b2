//! The two user-facing collections: todos and the media index.

use std::sync::Arc;

use serde_json::{json, Map};

use crate::error::{Error, Result};
use crate::mirror::{CollectionMirror, MirrorPolicy};
use crate::models::{MediaItem, Task};
use crate::store::DocumentStore;
use crate::watcher::SessionBound;

/// The signed-in user's todo list.
pub struct TaskList<S: DocumentStore + ?Sized + 'static> {
    mirror: Arc<CollectionMirror<Task, S>>,
}

impl<S: DocumentStore + ?Sized + 'static> TaskList<S> {
    pub fn new(store: Arc<S>, collection: impl Into<String>, policy: MirrorPolicy) -> Self {
        Self {
            mirror: Arc::new(CollectionMirror::with_collection(store, collection, policy)),
        }
    }

    /// Handle for a [`crate::watcher::SessionWatcher`].
    pub fn session_target(&self) -> Arc<dyn SessionBound> {
        self.mirror.clone()
    }

    pub async fn load(&self, user_id: &str) -> Result<Option<usize>> {
        self.mirror.load(user_id).await
    }

    /// Newest first.
    pub fn tasks(&self) -> Vec<Task> {
        self.mirror.records()
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.mirror.get(id)
    }

    pub fn owner(&self) -> Option<String> {
        self.mirror.owner()
    }

    pub async fn add(&self, text: &str) -> Result<Task> {
        let owner = self.mirror.owner().ok_or(Error::NotSignedIn)?;
        let draft = Task::draft(owner, text)?;
        self.mirror.create(draft).await
    }

    /// Flips the completion flag with a partial merge.
    pub async fn toggle(&self, id: &str) -> Result<Task> {
        let current = self
            .mirror
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let mut partial = Map::new();
        partial.insert("completed".to_string(), json!(!current.completed));
        self.mirror.update(id, partial).await
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.mirror.delete(id).await
    }
}

/// Index of the signed-in user's uploaded media.
pub struct MediaLibrary<S: DocumentStore + ?Sized + 'static> {
    mirror: Arc<CollectionMirror<MediaItem, S>>,
}

impl<S: DocumentStore + ?Sized + 'static> MediaLibrary<S> {
    pub fn new(store: Arc<S>, collection: impl Into<String>, policy: MirrorPolicy) -> Self {
        Self {
            mirror: Arc::new(CollectionMirror::with_collection(store, collection, policy)),
        }
    }

    pub fn session_target(&self) -> Arc<dyn SessionBound> {
        self.mirror.clone()
    }

    pub async fn load(&self, user_id: &str) -> Result<Option<usize>> {
        self.mirror.load(user_id).await
    }

    pub fn items(&self) -> Vec<MediaItem> {
        self.mirror.records()
    }

    pub fn get(&self, id: &str) -> Option<MediaItem> {
        self.mirror.get(id)
    }

    pub fn owner(&self) -> Option<String> {
        self.mirror.owner()
    }

    /// Indexes a binary the media endpoint already accepted.
    pub async fn record_upload(
        &self,
        owner_id: &str,
        url: &str,
        filename: &str,
    ) -> Result<MediaItem> {
        let draft = MediaItem::draft(owner_id, url, filename)?;
        self.mirror.create(draft).await
    }

    /// Drops the index entry. The remote binary is left in place.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.mirror.delete(id).await
    }
}
