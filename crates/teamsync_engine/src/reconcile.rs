//! Merging a remote batch into the local entity set.
//!
//! [`reconcile`] is a pure function: it reads the current local set and a
//! remote batch and returns the complete merged set without touching any
//! store. The caller decides whether to commit the result.
//!
//! ## Key Invariants
//!
//! - Upsert by external id: a remote record replaces the local one, or is inserted
//! - Derived fields are recomputed for every record from the merged raw
//!   fields only; previously derived values are never reused as inputs
//! - `updated_at_ms` moves only when a record's raw or derived fields change,
//!   so `reconcile(&reconcile(l, r)?, r)` equals `reconcile(l, r)`

use std::collections::{BTreeMap, HashMap};
use teamsync_model::{
    EntitySet, ExternalId, LocalMember, LocalTask, LocalTimeEntry, Member, MemberDerived,
    MemberStatus, RemoteBatch, Task, TaskDerived, TaskStatus, TimeEntry,
};
use thiserror::Error;

/// Result type for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Malformed remote data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A record arrived without an id.
    #[error("{kind} record with empty id")]
    EmptyId {
        /// Record kind.
        kind: &'static str,
    },

    /// Two different records share an id within one batch.
    #[error("conflicting duplicate {kind} id {id} in remote batch")]
    DuplicateId {
        /// Record kind.
        kind: &'static str,
        /// The shared id.
        id: ExternalId,
    },

    /// A time entry ends before it starts.
    #[error("time entry {id} ends at {end_ms} before it starts at {start_ms}")]
    InvalidInterval {
        /// Entry id.
        id: ExternalId,
        /// Entry start.
        start_ms: u64,
        /// Entry end.
        end_ms: u64,
    },
}

/// Computes derived fields from raw records.
///
/// Implementations must be deterministic: identical inputs give identical
/// outputs.
pub trait Derivation: Send + Sync {
    /// Derives member fields from the member and all of its merged entries.
    fn derive_member(&self, member: &Member, entries: &[&TimeEntry], now_ms: u64)
        -> MemberDerived;

    /// Derives task fields from the task and all entries tracked against it.
    fn derive_task(&self, task: &Task, entries: &[&TimeEntry], now_ms: u64) -> TaskDerived;
}

/// The dashboard's aggregation rules.
///
/// Only entries starting inside `window` count towards aggregates; running
/// entries count up to `now_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardDerivation {
    /// Half-open `[start_ms, end_ms)` aggregation window.
    pub window: (u64, u64),
}

impl StandardDerivation {
    /// Aggregates over `[start_ms, end_ms)`.
    pub fn new(start_ms: u64, end_ms: u64) -> Self {
        Self {
            window: (start_ms, end_ms),
        }
    }

    /// Aggregates over every entry.
    pub fn unbounded() -> Self {
        Self::new(0, u64::MAX)
    }

    fn in_window(&self, entry: &TimeEntry) -> bool {
        entry.start_ms >= self.window.0 && entry.start_ms < self.window.1
    }
}

impl Derivation for StandardDerivation {
    fn derive_member(
        &self,
        member: &Member,
        entries: &[&TimeEntry],
        now_ms: u64,
    ) -> MemberDerived {
        let counted: Vec<&&TimeEntry> = entries.iter().filter(|e| self.in_window(e)).collect();
        let tracked_ms = counted.iter().map(|e| e.duration_ms(now_ms)).sum();
        let status = if !member.active {
            MemberStatus::Inactive
        } else if counted.iter().any(|e| e.is_running()) {
            MemberStatus::Working
        } else if tracked_ms > 0 {
            MemberStatus::Active
        } else {
            MemberStatus::Idle
        };
        MemberDerived {
            tracked_ms,
            entry_count: counted.len() as u32,
            status,
        }
    }

    fn derive_task(&self, task: &Task, entries: &[&TimeEntry], now_ms: u64) -> TaskDerived {
        let tracked_ms: u64 = entries
            .iter()
            .filter(|e| self.in_window(e))
            .map(|e| e.duration_ms(now_ms))
            .sum();
        let completion_ratio = task
            .estimate_ms
            .filter(|estimate| *estimate > 0)
            .map(|estimate| (tracked_ms as f64 / estimate as f64).min(1.0));
        let status = if task.done {
            TaskStatus::Done
        } else if tracked_ms > 0 {
            TaskStatus::InProgress
        } else {
            TaskStatus::Open
        };
        TaskDerived {
            tracked_ms,
            completion_ratio,
            status,
        }
    }
}

/// Merges `remote` into `local` and recomputes every derived field.
///
/// Remote records are validated first; on error nothing is produced.
pub fn reconcile<D: Derivation + ?Sized>(
    local: &EntitySet,
    remote: &RemoteBatch,
    derive: &D,
    now_ms: u64,
) -> ReconcileResult<EntitySet> {
    let members = unique_by_id("member", &remote.members, |m| &m.id)?;
    let tasks = unique_by_id("task", &remote.tasks, |t| &t.id)?;
    let entries = unique_by_id("time entry", &remote.time_entries, |e| &e.id)?;
    for entry in entries.values() {
        if let Some(end_ms) = entry.end_ms {
            if end_ms < entry.start_ms {
                return Err(ReconcileError::InvalidInterval {
                    id: entry.id.clone(),
                    start_ms: entry.start_ms,
                    end_ms,
                });
            }
        }
    }

    // raw time entries
    let mut time_entries = local.time_entries.clone();
    for (id, entry) in entries {
        let unchanged = time_entries
            .get(id)
            .is_some_and(|existing| &existing.record == entry);
        if !unchanged {
            time_entries.insert(
                id.clone(),
                LocalTimeEntry {
                    record: entry.clone(),
                    updated_at_ms: now_ms,
                },
            );
        }
    }

    let mut by_member: HashMap<&ExternalId, Vec<&TimeEntry>> = HashMap::new();
    let mut by_task: HashMap<&ExternalId, Vec<&TimeEntry>> = HashMap::new();
    for local_entry in time_entries.values() {
        let entry = &local_entry.record;
        by_member.entry(&entry.member_id).or_default().push(entry);
        if let Some(task_id) = &entry.task_id {
            by_task.entry(task_id).or_default().push(entry);
        }
    }

    // raw members and tasks, local first then remote on top
    let mut raw_members: BTreeMap<&ExternalId, &Member> =
        local.members.iter().map(|(id, m)| (id, &m.record)).collect();
    raw_members.extend(members);
    let mut raw_tasks: BTreeMap<&ExternalId, &Task> =
        local.tasks.iter().map(|(id, t)| (id, &t.record)).collect();
    raw_tasks.extend(tasks);

    let mut merged_members = BTreeMap::new();
    for (id, member) in raw_members {
        let member_entries = by_member.get(id).map(Vec::as_slice).unwrap_or(&[]);
        let derived = derive.derive_member(member, member_entries, now_ms);
        let updated_at_ms = match local.members.get(id) {
            Some(prev) if &prev.record == member && prev.derived == derived => prev.updated_at_ms,
            _ => now_ms,
        };
        merged_members.insert(
            id.clone(),
            LocalMember {
                record: member.clone(),
                derived,
                updated_at_ms,
            },
        );
    }

    let mut merged_tasks = BTreeMap::new();
    for (id, task) in raw_tasks {
        let task_entries = by_task.get(id).map(Vec::as_slice).unwrap_or(&[]);
        let derived = derive.derive_task(task, task_entries, now_ms);
        let updated_at_ms = match local.tasks.get(id) {
            Some(prev) if &prev.record == task && prev.derived == derived => prev.updated_at_ms,
            _ => now_ms,
        };
        merged_tasks.insert(
            id.clone(),
            LocalTask {
                record: task.clone(),
                derived,
                updated_at_ms,
            },
        );
    }

    Ok(EntitySet {
        members: merged_members,
        tasks: merged_tasks,
        time_entries,
    })
}

/// Indexes records by id, tolerating exact duplicates and rejecting
/// conflicting ones.
fn unique_by_id<'a, T: PartialEq>(
    kind: &'static str,
    records: &'a [T],
    id_of: impl Fn(&T) -> &ExternalId,
) -> ReconcileResult<BTreeMap<&'a ExternalId, &'a T>> {
    let mut index = BTreeMap::new();
    for record in records {
        let id = id_of(record);
        if id.is_empty() {
            return Err(ReconcileError::EmptyId { kind });
        }
        if let Some(existing) = index.insert(id, record) {
            if existing != record {
                return Err(ReconcileError::DuplicateId {
                    kind,
                    id: id.clone(),
                });
            }
        }
    }
    Ok(index)
}
