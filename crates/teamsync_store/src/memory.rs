//! In-memory store for testing.

use crate::error::StoreResult;
use crate::store::LocalStore;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use teamsync_model::EntitySet;

/// An in-memory store.
///
/// Suitable for:
/// - Unit tests
/// - Integration tests
/// - Dashboards that don't need to survive a reload
///
/// # Example
///
/// ```rust
/// use teamsync_model::EntitySet;
/// use teamsync_store::{InMemoryStore, LocalStore};
///
/// let store = InMemoryStore::new();
/// store.bulk_upsert(&EntitySet::new()).unwrap();
/// assert_eq!(store.write_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entities: RwLock<EntitySet>,
    writes: AtomicU64,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `entities`.
    ///
    /// Useful for seeding a previous session's result.
    #[must_use]
    pub fn with_entities(entities: EntitySet) -> Self {
        Self {
            entities: RwLock::new(entities),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of successful `bulk_upsert` calls.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl LocalStore for InMemoryStore {
    fn read_all(&self) -> StoreResult<EntitySet> {
        Ok(self.entities.read().clone())
    }

    fn bulk_upsert(&self, entities: &EntitySet) -> StoreResult<()> {
        self.entities.write().upsert_all(entities);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        *self.entities.write() = EntitySet::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamsync_model::{LocalTask, Task, TaskDerived, TaskStatus};

    fn task_set(ids: &[&str]) -> EntitySet {
        let mut set = EntitySet::new();
        for id in ids {
            set.tasks.insert(
                (*id).into(),
                LocalTask {
                    record: Task::new(*id, "task"),
                    derived: TaskDerived {
                        tracked_ms: 0,
                        completion_ratio: None,
                        status: TaskStatus::Open,
                    },
                    updated_at_ms: 0,
                },
            );
        }
        set
    }

    #[test]
    fn upsert_merges_by_id() {
        let store = InMemoryStore::with_entities(task_set(&["t1"]));
        store.bulk_upsert(&task_set(&["t2"])).unwrap();

        let all = store.read_all().unwrap();
        assert_eq!(all.tasks.len(), 2);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn clear_empties_store() {
        let store = InMemoryStore::with_entities(task_set(&["t1", "t2"]));
        store.clear().unwrap();
        assert!(store.read_all().unwrap().is_empty());
    }
}
