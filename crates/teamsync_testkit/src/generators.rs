//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants: ids are non-empty and unique within
//! each collection, and every closed time entry ends at or after its start.

use proptest::prelude::*;
use std::collections::BTreeMap;
use teamsync_model::{
    EntitySet, ExternalId, LocalMember, LocalTask, LocalTimeEntry, Member, MemberDerived,
    MemberStatus, RemoteBatch, Task, TaskDerived, TaskStatus, TimeEntry,
};

const MEMBER_POOL: u32 = 8;
const TASK_POOL: u32 = 8;
const ENTRY_POOL: u32 = 24;

fn pooled_id(prefix: &'static str, pool: u32) -> impl Strategy<Value = ExternalId> {
    (0..pool).prop_map(move |n| ExternalId::new(format!("{prefix}{n}")))
}

/// Strategy for generating members with ids `m0..m7`.
pub fn member_strategy() -> impl Strategy<Value = Member> {
    (
        pooled_id("m", MEMBER_POOL),
        prop::string::string_regex("[A-Z][a-z]{1,8}").expect("Invalid regex"),
        any::<bool>(),
    )
        .prop_map(|(id, name, active)| Member {
            id,
            email: format!("{}@example.com", name.to_lowercase()),
            name,
            active,
        })
}

/// Strategy for generating tasks with ids `t0..t7`.
pub fn task_strategy() -> impl Strategy<Value = Task> {
    (
        pooled_id("t", TASK_POOL),
        prop::option::of(pooled_id("m", MEMBER_POOL)),
        prop::option::of(0u64..20_000),
        any::<bool>(),
    )
        .prop_map(|(id, member_id, estimate_ms, done)| Task {
            name: format!("Task {id}"),
            id,
            member_id,
            estimate_ms,
            done,
        })
}

/// Strategy for generating time entries with valid intervals.
pub fn time_entry_strategy() -> impl Strategy<Value = TimeEntry> {
    (
        pooled_id("e", ENTRY_POOL),
        pooled_id("m", MEMBER_POOL),
        prop::option::of(pooled_id("t", TASK_POOL)),
        0u64..100_000,
        prop::option::of(0u64..10_000),
    )
        .prop_map(|(id, member_id, task_id, start_ms, length)| TimeEntry {
            id,
            member_id,
            task_id,
            start_ms,
            end_ms: length.map(|l| start_ms + l),
            description: String::new(),
        })
}

fn unique_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> &ExternalId) -> Vec<T> {
    let mut seen = BTreeMap::new();
    for item in items {
        seen.entry(id(&item).clone()).or_insert(item);
    }
    seen.into_values().collect()
}

/// Strategy for generating a well-formed remote batch.
pub fn remote_batch_strategy() -> impl Strategy<Value = RemoteBatch> {
    (
        prop::collection::vec(member_strategy(), 0..6),
        prop::collection::vec(task_strategy(), 0..6),
        prop::collection::vec(time_entry_strategy(), 0..12),
    )
        .prop_map(|(members, tasks, time_entries)| RemoteBatch {
            members: unique_by_id(members, |m| &m.id),
            tasks: unique_by_id(tasks, |t| &t.id),
            time_entries: unique_by_id(time_entries, |e| &e.id),
        })
}

/// Strategy for generating a cached entity set.
///
/// Derived fields and timestamps are arbitrary, as a stale cache would have.
pub fn entity_set_strategy() -> impl Strategy<Value = EntitySet> {
    (remote_batch_strategy(), 0u64..1_000, 0u64..50_000).prop_map(
        |(batch, updated_at_ms, tracked_ms)| {
            let mut set = EntitySet::new();
            for record in batch.members {
                set.members.insert(
                    record.id.clone(),
                    LocalMember {
                        record,
                        derived: MemberDerived {
                            tracked_ms,
                            entry_count: 1,
                            status: MemberStatus::Active,
                        },
                        updated_at_ms,
                    },
                );
            }
            for record in batch.tasks {
                set.tasks.insert(
                    record.id.clone(),
                    LocalTask {
                        record,
                        derived: TaskDerived {
                            tracked_ms,
                            completion_ratio: None,
                            status: TaskStatus::Open,
                        },
                        updated_at_ms,
                    },
                );
            }
            for record in batch.time_entries {
                set.time_entries.insert(
                    record.id.clone(),
                    LocalTimeEntry {
                        record,
                        updated_at_ms,
                    },
                );
            }
            set
        },
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
