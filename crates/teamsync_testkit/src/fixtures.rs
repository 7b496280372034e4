//! Entity fixtures and store helpers.
//!
//! Provides small, valid data sets for reconciliation and engine tests.

use std::path::{Path, PathBuf};
use teamsync_model::{
    EntitySet, LocalMember, LocalTask, LocalTimeEntry, Member, MemberDerived, MemberStatus,
    RemoteBatch, Task, TaskDerived, TaskStatus, TimeEntry,
};
use teamsync_store::FileStore;
use tempfile::TempDir;

/// One hour in milliseconds.
pub const HOUR_MS: u64 = 3_600_000;

/// An active member.
pub fn member(id: &str, name: &str) -> Member {
    Member::new(id, name)
}

/// An open, unassigned task.
pub fn task(id: &str, name: &str) -> Task {
    Task::new(id, name)
}

/// An open task with a time estimate.
pub fn task_with_estimate(id: &str, estimate_ms: u64) -> Task {
    Task {
        estimate_ms: Some(estimate_ms),
        ..Task::new(id, format!("Task {id}"))
    }
}

/// A task assigned to `member_id`.
pub fn assigned_task(id: &str, member_id: &str) -> Task {
    Task {
        member_id: Some(member_id.into()),
        ..Task::new(id, format!("Task {id}"))
    }
}

/// A time entry. `end_ms = None` is a running timer.
pub fn entry(
    id: &str,
    member_id: &str,
    task_id: Option<&str>,
    start_ms: u64,
    end_ms: Option<u64>,
) -> TimeEntry {
    TimeEntry {
        id: id.into(),
        member_id: member_id.into(),
        task_id: task_id.map(Into::into),
        start_ms,
        end_ms,
        description: String::new(),
    }
}

/// A small batch: three members, three tasks and four entries.
pub fn sample_batch() -> RemoteBatch {
    RemoteBatch {
        members: vec![
            member("m1", "Ada"),
            member("m2", "Grace"),
            Member {
                active: false,
                ..member("m3", "Edsger")
            },
        ],
        tasks: vec![
            task_with_estimate("t1", 4 * HOUR_MS),
            assigned_task("t2", "m2"),
            Task {
                done: true,
                ..task("t3", "Release")
            },
        ],
        time_entries: vec![
            entry("e1", "m1", Some("t1"), 0, Some(HOUR_MS)),
            entry("e2", "m1", Some("t1"), 2 * HOUR_MS, None),
            entry("e3", "m2", Some("t2"), HOUR_MS, Some(3 * HOUR_MS)),
            entry("e4", "m2", None, 4 * HOUR_MS, Some(5 * HOUR_MS)),
        ],
    }
}

/// A cached set with `count` members, tasks and entries.
///
/// Derived fields are placeholders; reconciliation recomputes them.
pub fn sample_entity_set(count: usize) -> EntitySet {
    let mut set = EntitySet::new();
    for i in 0..count {
        let member_id = format!("cached-m{i}");
        let task_id = format!("cached-t{i}");
        let start = i as u64 * HOUR_MS;

        set.members.insert(
            member_id.as_str().into(),
            LocalMember {
                record: member(&member_id, &format!("Member {i}")),
                derived: MemberDerived {
                    tracked_ms: 0,
                    entry_count: 0,
                    status: MemberStatus::Idle,
                },
                updated_at_ms: 1,
            },
        );
        set.tasks.insert(
            task_id.as_str().into(),
            LocalTask {
                record: task(&task_id, &format!("Task {i}")),
                derived: TaskDerived {
                    tracked_ms: 0,
                    completion_ratio: None,
                    status: TaskStatus::Open,
                },
                updated_at_ms: 1,
            },
        );
        let entry_id = format!("cached-e{i}");
        set.time_entries.insert(
            entry_id.as_str().into(),
            LocalTimeEntry {
                record: entry(&entry_id, &member_id, Some(&task_id), start, Some(start + HOUR_MS / 2)),
                updated_at_ms: 1,
            },
        );
    }
    set
}

/// A file store in a temporary directory, removed on drop.
pub struct TempFileStore {
    /// The store.
    pub store: FileStore,
    _temp_dir: TempDir,
}

impl TempFileStore {
    /// Creates a store at `<tempdir>/cache/entities.json`.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(&temp_dir.path().join("cache").join("entities.json"))
            .expect("Failed to open file store");
        Self {
            store,
            _temp_dir: temp_dir,
        }
    }

    /// The directory holding the store.
    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }

    /// The snapshot path.
    pub fn path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempFileStore {
    type Target = FileStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs `f` with a fresh temporary file store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&FileStore) -> R,
{
    let temp = TempFileStore::new();
    f(&temp.store)
}
