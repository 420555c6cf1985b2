//! Local mirror of one user's slice of a remote collection.
//!
//! Reads are scoped by an equality filter on the owner field and sorted
//! locally, newest first. Mutations go to the store first; local state only
//! changes after the store acknowledged them, so a failed call leaves the
//! mirror exactly as it was.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Record, OWNER_FIELD};
use crate::store::{Document, DocumentStore, Fields, Filter};
use crate::watcher::SessionBound;

const CREATE_KEY: &str = "<create>";

/// How local state follows a successful mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MirrorPolicy {
    /// Apply the acknowledged change to the local list directly.
    #[default]
    ApplyOnAck,
    /// Re-run the scoped query after every acknowledged change.
    Refetch,
}

struct MirrorState<R> {
    owner: Option<String>,
    records: Vec<R>,
    /// Bumped whenever the mirror changes hands (clear or new owner).
    epoch: u64,
    /// Local mutation counter.
    seq: u64,
    /// Last local mutation per record id, kept while fetches are in flight.
    touched: HashMap<String, u64>,
    fetches_in_flight: usize,
}

impl<R> Default for MirrorState<R> {
    fn default() -> Self {
        Self {
            owner: None,
            records: Vec::new(),
            epoch: 0,
            seq: 0,
            touched: HashMap::new(),
            fetches_in_flight: 0,
        }
    }
}

impl<R: Record> MirrorState<R> {
    fn touch(&mut self, id: &str) {
        self.seq += 1;
        if self.fetches_in_flight > 0 {
            self.touched.insert(id.to_string(), self.seq);
        }
    }

    fn reset(&mut self, owner: Option<String>) {
        self.owner = owner;
        self.records.clear();
        self.touched.clear();
        self.epoch += 1;
    }
}

/// In-memory reflection of the records a user owns in one collection.
pub struct CollectionMirror<R: Record, S: DocumentStore + ?Sized> {
    store: Arc<S>,
    collection: String,
    policy: MirrorPolicy,
    state: Mutex<MirrorState<R>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record, S: DocumentStore + ?Sized> CollectionMirror<R, S> {
    /// Mirror of `R::COLLECTION`.
    pub fn new(store: Arc<S>, policy: MirrorPolicy) -> Self {
        Self::with_collection(store, R::COLLECTION, policy)
    }

    pub fn with_collection(store: Arc<S>, collection: impl Into<String>, policy: MirrorPolicy) -> Self {
        Self {
            store,
            collection: collection.into(),
            policy,
            state: Mutex::new(MirrorState::default()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            _record: PhantomData,
        }
    }

    /// Snapshot of the local list, newest first.
    pub fn records(&self) -> Vec<R> {
        self.lock().records.clone()
    }

    pub fn get(&self, id: &str) -> Option<R> {
        self.lock()
            .records
            .iter()
            .find(|record| record.id() == id)
            .cloned()
    }

    pub fn owner(&self) -> Option<String> {
        self.lock().owner.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Whether a mutation keyed by `id` is currently in flight.
    pub fn is_busy(&self, id: &str) -> bool {
        lock_set(&self.in_flight).contains(id)
    }

    /// Reads every record owned by `user_id`, newest first.
    ///
    /// Documents that do not parse as `R` are skipped with a warning.
    pub async fn fetch_scoped(&self, user_id: &str) -> Result<Vec<R>> {
        let filter = Filter::eq(OWNER_FIELD, user_id);
        let documents = self
            .store
            .query(&self.collection, &filter)
            .await
            .map_err(|error| {
                tracing::error!("Error fetching {}: {}", self.collection, error);
                error
            })?;

        let mut records = documents
            .into_iter()
            .filter_map(|document| match R::from_document(document) {
                Ok(record) => Some(record),
                Err(error) => {
                    tracing::warn!("Skipping unreadable {} document: {}", self.collection, error);
                    None
                }
            })
            .filter(|record| record.owner_id() == user_id)
            .collect::<Vec<_>>();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// Fetches `user_id`'s records and merges them into the local list.
    ///
    /// Switching owner empties the list first. Local mutations acknowledged
    /// while the fetch was in flight win over the fetched copy. A fetch that
    /// lands after the mirror changed hands is dropped and yields `None`.
    pub async fn load(&self, user_id: &str) -> Result<Option<usize>> {
        self.load_within(user_id, None).await
    }

    /// Like [`Self::load`], but only while the mirror is still in `epoch`
    /// and owned by `user_id`. Never takes ownership on its own.
    async fn load_within(&self, user_id: &str, expected: Option<u64>) -> Result<Option<usize>> {
        let (epoch, since) = {
            let mut state = self.lock();
            if let Some(expected) = expected {
                if state.epoch != expected || state.owner.as_deref() != Some(user_id) {
                    tracing::debug!("Skipping {} reload; mirror changed hands", self.collection);
                    return Ok(None);
                }
            } else if state.owner.as_deref() != Some(user_id) {
                state.reset(Some(user_id.to_string()));
            }
            state.fetches_in_flight += 1;
            (state.epoch, state.seq)
        };

        let fetched = self.fetch_scoped(user_id).await;

        let mut state = self.lock();
        state.fetches_in_flight -= 1;
        let result = match fetched {
            Ok(_) if state.epoch != epoch => {
                tracing::debug!("Dropping stale {} fetch for {}", self.collection, user_id);
                Ok(None)
            }
            Ok(fetched) => {
                let merged = merge_fetched(fetched, &state.records, &state.touched, since);
                state.records = merged;
                tracing::info!(
                    "Loaded {} {} records for user {}",
                    state.records.len(),
                    self.collection,
                    user_id
                );
                Ok(Some(state.records.len()))
            }
            Err(error) => Err(error),
        };
        if state.fetches_in_flight == 0 {
            state.touched.clear();
        }
        result
    }

    /// Forgets the owner and every local record.
    pub fn clear(&self) {
        self.lock().reset(None);
        tracing::debug!("Cleared {} mirror", self.collection);
    }

    /// Inserts `draft` remotely and returns it with the store-assigned id.
    pub async fn create(&self, draft: R) -> Result<R> {
        let owner = self.require_owner()?;
        if draft.owner_id() != owner {
            return Err(Error::InvalidInput(format!(
                "Record owner {} does not match signed-in user {owner}",
                draft.owner_id()
            )));
        }
        let _guard = InFlightGuard::acquire(&self.in_flight, CREATE_KEY)?;
        let epoch = self.lock().epoch;

        let fields = draft.to_fields()?;
        let id = self
            .store
            .insert(&self.collection, fields)
            .await
            .map_err(|error| {
                tracing::error!("Error adding to {}: {}", self.collection, error);
                error
            })?;
        let mut record = draft;
        record.set_id(id);
        tracing::info!("Created {} record {}", self.collection, record.id());

        match self.policy {
            MirrorPolicy::ApplyOnAck => {
                let mut state = self.lock();
                if state.epoch == epoch {
                    state.records.push(record.clone());
                    sort_newest_first(&mut state.records);
                    state.touch(record.id());
                }
            }
            MirrorPolicy::Refetch => self.refetch(&owner, epoch).await,
        }
        Ok(record)
    }

    /// Merges `partial` into the record remotely, then locally.
    pub async fn update(&self, id: &str, partial: Fields) -> Result<R> {
        let owner = self.require_owner()?;
        let current = self
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let _guard = InFlightGuard::acquire(&self.in_flight, id)?;
        let epoch = self.lock().epoch;

        let updated = apply_partial(&current, &partial)?;
        self.store
            .merge_update(&self.collection, id, partial)
            .await
            .map_err(|error| {
                tracing::error!("Error updating {} record {}: {}", self.collection, id, error);
                error
            })?;

        match self.policy {
            MirrorPolicy::ApplyOnAck => {
                let mut state = self.lock();
                if state.epoch == epoch {
                    if let Some(slot) = state.records.iter_mut().find(|record| record.id() == id) {
                        *slot = updated.clone();
                    }
                    sort_newest_first(&mut state.records);
                    state.touch(id);
                }
            }
            MirrorPolicy::Refetch => self.refetch(&owner, epoch).await,
        }
        Ok(updated)
    }

    /// Removes the record remotely, then drops any local entry with that id.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let owner = self.require_owner()?;
        let _guard = InFlightGuard::acquire(&self.in_flight, id)?;
        let epoch = self.lock().epoch;

        self.store
            .remove(&self.collection, id)
            .await
            .map_err(|error| {
                tracing::error!("Error deleting {} record {}: {}", self.collection, id, error);
                error
            })?;
        tracing::info!("Deleted {} record {}", self.collection, id);

        match self.policy {
            MirrorPolicy::ApplyOnAck => {
                let mut state = self.lock();
                if state.epoch == epoch {
                    state.records.retain(|record| record.id() != id);
                    state.touch(id);
                }
            }
            MirrorPolicy::Refetch => self.refetch(&owner, epoch).await,
        }
        Ok(())
    }

    /// The write already succeeded; a failed re-read only leaves the list stale.
    async fn refetch(&self, owner: &str, epoch: u64) {
        if let Err(error) = self.load_within(owner, Some(epoch)).await {
            tracing::warn!("Refetch of {} failed: {}", self.collection, error);
        }
    }

    fn require_owner(&self) -> Result<String> {
        self.lock().owner.clone().ok_or(Error::NotSignedIn)
    }

    fn lock(&self) -> MutexGuard<'_, MirrorState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<R: Record, S: DocumentStore + ?Sized + 'static> SessionBound for CollectionMirror<R, S> {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn load_for(&self, user_id: &str) -> Result<Option<usize>> {
        self.load(user_id).await
    }

    fn clear(&self) {
        Self::clear(self);
    }
}

struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, key: &str) -> Result<Self> {
        if !lock_set(set).insert(key.to_string()) {
            return Err(Error::Busy(key.to_string()));
        }
        Ok(Self {
            set: Arc::clone(set),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_set(&self.set).remove(&self.key);
    }
}

fn lock_set(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sort_newest_first<R: Record>(records: &mut [R]) {
    records.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| a.id().cmp(b.id()))
    });
}

fn merge_fetched<R: Record>(
    fetched: Vec<R>,
    local: &[R],
    touched: &HashMap<String, u64>,
    since: u64,
) -> Vec<R> {
    let recent = touched
        .iter()
        .filter(|(_, seq)| **seq > since)
        .map(|(id, _)| id.as_str())
        .collect::<HashSet<_>>();

    let mut merged = fetched
        .into_iter()
        .filter(|record| !recent.contains(record.id()))
        .collect::<Vec<_>>();
    merged.extend(
        local
            .iter()
            .filter(|record| recent.contains(record.id()))
            .cloned(),
    );
    sort_newest_first(&mut merged);
    merged
}

fn apply_partial<R: Record>(record: &R, partial: &Fields) -> Result<R> {
    let mut fields = record.to_fields()?;
    for (key, value) in partial {
        if key == "id" {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }
    if fields.get(OWNER_FIELD) != Some(&Value::String(record.owner_id().to_string())) {
        return Err(Error::InvalidInput(
            "Updates cannot change the record owner".to_string(),
        ));
    }
    R::from_document(Document::new(record.id(), fields))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::{Notify, Semaphore};

    use super::*;
    use crate::models::Task;
    use crate::store::{MemoryDocumentStore, StoreOp};

    /// Store whose inserts wait for a permit after they started.
    struct GatedStore {
        inner: MemoryDocumentStore,
        insert_started: Notify,
        gate: Semaphore,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryDocumentStore::new(),
                insert_started: Notify::new(),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for GatedStore {
        async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
            self.inner.query(collection, filter).await
        }

        async fn insert(&self, collection: &str, fields: Fields) -> Result<String> {
            self.insert_started.notify_one();
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|error| Error::Store(error.to_string()))?;
            self.inner.insert(collection, fields).await
        }

        async fn merge_update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
            self.inner.merge_update(collection, id, fields).await
        }

        async fn remove(&self, collection: &str, id: &str) -> Result<()> {
            self.inner.remove(collection, id).await
        }
    }

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn seed_task(store: &MemoryDocumentStore, id: &str, owner: &str, created_at: i64) {
        store.seed(
            "todos",
            id,
            fields(json!({
                "task": format!("task {id}"),
                "completed": false,
                "user_id": owner,
                "created_at": created_at,
            })),
        );
    }

    fn mirror(
        store: &Arc<MemoryDocumentStore>,
        policy: MirrorPolicy,
    ) -> CollectionMirror<Task, MemoryDocumentStore> {
        CollectionMirror::new(Arc::clone(store), policy)
    }

    fn ids(records: &[Task]) -> Vec<&str> {
        records.iter().map(|task| task.id.as_str()).collect()
    }

    #[tokio::test]
    async fn fetch_scoped_filters_by_owner_and_sorts_newest_first() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        seed_task(&store, "t2", "u", 200);
        seed_task(&store, "v1", "v", 300);

        let tasks = mirror(&store, MirrorPolicy::ApplyOnAck)
            .fetch_scoped("u")
            .await
            .unwrap();
        assert_eq!(ids(&tasks), vec!["t2", "t1"]);
    }

    #[tokio::test]
    async fn fetch_skips_unreadable_documents() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        store.seed("todos", "bad", fields(json!({"user_id": "u", "completed": "nope"})));

        let tasks = mirror(&store, MirrorPolicy::ApplyOnAck)
            .fetch_scoped("u")
            .await
            .unwrap();
        assert_eq!(ids(&tasks), vec!["t1"]);
    }

    #[tokio::test]
    async fn load_failure_keeps_previous_list() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        let mirror = mirror(&store, MirrorPolicy::ApplyOnAck);
        mirror.load("u").await.unwrap();

        store.fail_next(StoreOp::Query, "offline");
        assert!(mirror.load("u").await.is_err());
        assert_eq!(ids(&mirror.records()), vec!["t1"]);
    }

    #[tokio::test]
    async fn load_for_new_owner_drops_previous_records() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        seed_task(&store, "v1", "v", 100);
        let mirror = mirror(&store, MirrorPolicy::ApplyOnAck);

        mirror.load("u").await.unwrap();
        mirror.load("v").await.unwrap();
        assert_eq!(ids(&mirror.records()), vec!["v1"]);
        assert_eq!(mirror.owner().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn create_then_delete_restores_previous_list() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        let mirror = mirror(&store, MirrorPolicy::ApplyOnAck);
        mirror.load("u").await.unwrap();
        let before = mirror.records();

        let created = mirror.create(Task::draft("u", "new").unwrap()).await.unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(mirror.len(), 2);
        assert_eq!(mirror.records()[0], created);

        mirror.delete(&created.id).await.unwrap();
        assert_eq!(mirror.records(), before);
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn failed_create_leaves_local_state_untouched() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mirror = mirror(&store, MirrorPolicy::ApplyOnAck);
        mirror.load("u").await.unwrap();

        store.fail_next(StoreOp::Insert, "permission denied");
        let error = mirror
            .create(Task::draft("u", "new").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Store(_)));
        assert!(mirror.is_empty());
        assert!(!mirror.is_busy(CREATE_KEY));
    }

    #[tokio::test]
    async fn failed_delete_keeps_record() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        let mirror = mirror(&store, MirrorPolicy::ApplyOnAck);
        mirror.load("u").await.unwrap();

        store.fail_next(StoreOp::Remove, "network");
        assert!(mirror.delete("t1").await.is_err());
        assert_eq!(ids(&mirror.records()), vec!["t1"]);
    }

    #[tokio::test]
    async fn create_requires_signed_in_owner() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mirror = mirror(&store, MirrorPolicy::ApplyOnAck);
        assert!(matches!(
            mirror.create(Task::draft("u", "x").unwrap()).await,
            Err(Error::NotSignedIn)
        ));

        mirror.load("u").await.unwrap();
        assert!(matches!(
            mirror.create(Task::draft("v", "x").unwrap()).await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(store.count("todos"), 0);
    }

    #[tokio::test]
    async fn update_applies_partial_merge_locally_and_remotely() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        let mirror = mirror(&store, MirrorPolicy::ApplyOnAck);
        mirror.load("u").await.unwrap();

        let updated = mirror
            .update("t1", fields(json!({"completed": true})))
            .await
            .unwrap();
        assert!(updated.completed);
        assert!(mirror.get("t1").unwrap().completed);
        assert_eq!(store.get("todos", "t1").unwrap()["completed"], json!(true));
    }

    #[tokio::test]
    async fn update_cannot_reassign_owner() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        let mirror = mirror(&store, MirrorPolicy::ApplyOnAck);
        mirror.load("u").await.unwrap();

        assert!(mirror
            .update("t1", fields(json!({"user_id": "v"})))
            .await
            .is_err());
        assert_eq!(store.get("todos", "t1").unwrap()["user_id"], json!("u"));
    }

    #[tokio::test]
    async fn refetch_policy_reloads_after_mutation() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mirror = mirror(&store, MirrorPolicy::Refetch);
        assert_eq!(mirror.load("u").await.unwrap(), Some(0));
        assert_eq!(store.query_count(), 1);

        let created = mirror.create(Task::draft("u", "a").unwrap()).await.unwrap();
        assert_eq!(store.query_count(), 2);
        assert_eq!(ids(&mirror.records()), vec![created.id.as_str()]);

        mirror.delete(&created.id).await.unwrap();
        assert_eq!(store.query_count(), 3);
        assert!(mirror.is_empty());
    }

    #[tokio::test]
    async fn stale_fetch_does_not_resurrect_deleted_record() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        seed_task(&store, "t2", "u", 200);
        let mirror = Arc::new(mirror(&store, MirrorPolicy::ApplyOnAck));
        mirror.load("u").await.unwrap();

        let mut hold = store.hold_next_query();
        let reload = {
            let mirror = Arc::clone(&mirror);
            tokio::spawn(async move { mirror.load("u").await })
        };
        hold.snapshot_taken().await;
        mirror.delete("t1").await.unwrap();
        hold.release();
        reload.await.unwrap().unwrap();

        assert_eq!(ids(&mirror.records()), vec!["t2"]);
    }

    #[tokio::test]
    async fn stale_fetch_keeps_record_created_meanwhile() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mirror = Arc::new(mirror(&store, MirrorPolicy::ApplyOnAck));
        mirror.load("u").await.unwrap();

        let mut hold = store.hold_next_query();
        let reload = {
            let mirror = Arc::clone(&mirror);
            tokio::spawn(async move { mirror.load("u").await })
        };
        hold.snapshot_taken().await;
        let created = mirror.create(Task::draft("u", "late").unwrap()).await.unwrap();
        hold.release();
        reload.await.unwrap().unwrap();

        assert_eq!(ids(&mirror.records()), vec![created.id.as_str()]);
    }

    #[tokio::test]
    async fn fetch_landing_after_clear_is_dropped() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        let mirror = Arc::new(mirror(&store, MirrorPolicy::ApplyOnAck));

        let mut hold = store.hold_next_query();
        let load = {
            let mirror = Arc::clone(&mirror);
            tokio::spawn(async move { mirror.load("u").await })
        };
        hold.snapshot_taken().await;
        mirror.clear();
        hold.release();
        assert_eq!(load.await.unwrap().unwrap(), None);

        assert!(mirror.is_empty());
        assert!(mirror.owner().is_none());
    }

    #[tokio::test]
    async fn refetch_after_sign_out_leaves_mirror_empty() {
        let store = Arc::new(GatedStore::new());
        seed_task(&store.inner, "t1", "u", 100);
        let mirror = Arc::new(CollectionMirror::<Task, _>::new(
            Arc::clone(&store),
            MirrorPolicy::Refetch,
        ));
        mirror.load("u").await.unwrap();

        let create = {
            let mirror = Arc::clone(&mirror);
            tokio::spawn(async move { mirror.create(Task::draft("u", "late").unwrap()).await })
        };
        store.insert_started.notified().await;
        mirror.clear();
        store.gate.add_permits(1);
        create.await.unwrap().unwrap();

        assert!(mirror.is_empty());
        assert!(mirror.owner().is_none());
        assert_eq!(store.inner.query_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_mutation_on_same_record_is_rejected() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_task(&store, "t1", "u", 100);
        let mirror = mirror(&store, MirrorPolicy::ApplyOnAck);
        mirror.load("u").await.unwrap();

        let _held = InFlightGuard::acquire(&mirror.in_flight, "t1").unwrap();
        assert!(matches!(mirror.delete("t1").await, Err(Error::Busy(_))));
        assert_eq!(store.count("todos"), 1);
    }
}
