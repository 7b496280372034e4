//! Benchmark utilities.

#![warn(missing_docs)]

use rand::Rng;
use teamsync_model::{Member, RemoteBatch, Task, TimeEntry};

/// Generates a batch of `members` members, each with `entries_per_member`
/// closed time entries spread over `tasks` tasks.
pub fn generate_batch(members: usize, tasks: usize, entries_per_member: usize) -> RemoteBatch {
    let mut rng = rand::thread_rng();
    let tasks = tasks.max(1);

    let member_records = (0..members)
        .map(|i| Member::new(format!("m{i}"), format!("Member {i}")))
        .collect();
    let task_records = (0..tasks)
        .map(|i| Task {
            estimate_ms: Some(rng.gen_range(1..40) * 900_000),
            ..Task::new(format!("t{i}"), format!("Task {i}"))
        })
        .collect();

    let mut time_entries = Vec::with_capacity(members * entries_per_member);
    for m in 0..members {
        for e in 0..entries_per_member {
            let start_ms: u64 = rng.gen_range(0..86_400_000);
            let length: u64 = rng.gen_range(60_000..7_200_000);
            time_entries.push(TimeEntry {
                id: format!("e{m}-{e}").into(),
                member_id: format!("m{m}").into(),
                task_id: Some(format!("t{}", rng.gen_range(0..tasks)).into()),
                start_ms,
                end_ms: Some(start_ms + length),
                description: String::new(),
            });
        }
    }

    RemoteBatch {
        members: member_records,
        tasks: task_records,
        time_entries,
    }
}
