//! Store doubles for exercising engine failure paths.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use teamsync_model::EntitySet;
use teamsync_store::{InMemoryStore, LocalStore, StoreError, StoreResult};

/// An in-memory store whose reads or writes can be made to fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: InMemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingStore {
    /// Creates a store that does not fail yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes reads fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The backing store.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

impl LocalStore for FailingStore {
    fn read_all(&self) -> StoreResult<EntitySet> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        self.inner.read_all()
    }

    fn bulk_upsert(&self, entities: &EntitySet) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        self.inner.bulk_upsert(entities)
    }

    fn clear(&self) -> StoreResult<()> {
        self.inner.clear()
    }
}

/// An in-memory store that keeps a copy of every write.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    writes: Mutex<Vec<EntitySet>>,
}

impl RecordingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every set passed to `bulk_upsert`, in call order.
    pub fn writes(&self) -> Vec<EntitySet> {
        self.writes.lock().clone()
    }

    /// Number of `bulk_upsert` calls.
    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }
}

impl LocalStore for RecordingStore {
    fn read_all(&self) -> StoreResult<EntitySet> {
        self.inner.read_all()
    }

    fn bulk_upsert(&self, entities: &EntitySet) -> StoreResult<()> {
        self.inner.bulk_upsert(entities)?;
        self.writes.lock().push(entities.clone());
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        self.inner.clear()
    }
}
