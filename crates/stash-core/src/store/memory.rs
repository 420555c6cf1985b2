//! In-process document store (primarily for tests and offline demos).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{Document, DocumentStore, Fields, Filter};
use crate::error::{Error, Result};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Query,
    Insert,
    Update,
    Remove,
}

#[derive(Default)]
struct State {
    collections: HashMap<String, HashMap<String, Fields>>,
    failures: HashMap<StoreOp, String>,
    held_query: Option<HeldQuery>,
}

struct HeldQuery {
    taken: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Handle for a query paused after it read its snapshot.
pub struct QueryHold {
    taken: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl QueryHold {
    /// Resolves once the held query has read the store.
    pub async fn snapshot_taken(&mut self) {
        let _ = (&mut self.taken).await;
    }

    /// Lets the held query return its (possibly stale) snapshot.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// `HashMap`-backed store with store-assigned UUID v7 identifiers.
///
/// Iteration order is unspecified, like a real filtered read.
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<State>,
    queries: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document with a caller-chosen identifier.
    pub fn seed(&self, collection: &str, id: impl Into<String>, fields: Fields) {
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.into(), fields);
    }

    /// Makes the next call of `op` fail with `message`.
    pub fn fail_next(&self, op: StoreOp, message: impl Into<String>) {
        self.lock().failures.insert(op, message.into());
    }

    /// Pauses the next query between reading and returning its result.
    pub fn hold_next_query(&self) -> QueryHold {
        let (taken_tx, taken_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.lock().held_query = Some(HeldQuery {
            taken: taken_tx,
            release: release_rx,
        });
        QueryHold {
            taken: taken_rx,
            release: release_tx,
        }
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Fields> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, HashMap::len)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn take_failure(state: &mut State, op: StoreOp) -> Result<()> {
        match state.failures.remove(&op) {
            Some(message) => Err(Error::Store(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let (documents, held) = {
            let mut state = self.lock();
            Self::take_failure(&mut state, StoreOp::Query)?;
            let documents = state
                .collections
                .get(collection)
                .map(|documents| {
                    documents
                        .iter()
                        .filter(|(_, fields)| filter.matches(fields))
                        .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            (documents, state.held_query.take())
        };

        if let Some(held) = held {
            let _ = held.taken.send(());
            let _ = held.release.await;
        }
        Ok(documents)
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String> {
        let mut state = self.lock();
        Self::take_failure(&mut state, StoreOp::Insert)?;
        let id = Uuid::now_v7().to_string();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn merge_update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let mut state = self.lock();
        Self::take_failure(&mut state, StoreOp::Update)?;
        let document = state
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| Error::Store(format!("No document to update: {collection}/{id}")))?;
        document.extend(fields);
        Ok(())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<()> {
        let mut state = self.lock();
        Self::take_failure(&mut state, StoreOp::Remove)?;
        if let Some(documents) = state.collections.get_mut(collection) {
            documents.remove(id);
        }
        Ok(())
    }
}
