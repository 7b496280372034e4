//! Entity records mirrored from the remote team-management service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier assigned by the remote service.
///
/// The local copy of every record is keyed by this id; it never changes
/// for the lifetime of the remote record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    /// Creates an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty (never valid on the wire).
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExternalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExternalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A team member as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Remote id.
    pub id: ExternalId,
    /// Display name.
    pub name: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Whether the remote account is enabled.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Member {
    /// Creates an active member.
    pub fn new(id: impl Into<ExternalId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: String::new(),
            active: true,
        }
    }
}

/// A task as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Remote id.
    pub id: ExternalId,
    /// Task title.
    pub name: String,
    /// Assigned member, if any.
    #[serde(default)]
    pub member_id: Option<ExternalId>,
    /// Time estimate in milliseconds.
    #[serde(default)]
    pub estimate_ms: Option<u64>,
    /// Whether the task is closed remotely.
    #[serde(default)]
    pub done: bool,
}

impl Task {
    /// Creates an open, unassigned task.
    pub fn new(id: impl Into<ExternalId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            member_id: None,
            estimate_ms: None,
            done: false,
        }
    }
}

/// A tracked time interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    /// Remote id.
    pub id: ExternalId,
    /// Member who tracked the time.
    pub member_id: ExternalId,
    /// Task the time was tracked against.
    #[serde(default)]
    pub task_id: Option<ExternalId>,
    /// Interval start (epoch millis).
    pub start_ms: u64,
    /// Interval end (epoch millis); `None` while the timer is running.
    #[serde(default)]
    pub end_ms: Option<u64>,
    /// Free-form note.
    #[serde(default)]
    pub description: String,
}

impl TimeEntry {
    /// Returns true if the timer has not been stopped.
    pub fn is_running(&self) -> bool {
        self.end_ms.is_none()
    }

    /// Returns the tracked duration, counting running entries up to `now_ms`.
    pub fn duration_ms(&self, now_ms: u64) -> u64 {
        self.end_ms
            .unwrap_or(now_ms)
            .saturating_sub(self.start_ms)
    }
}

/// Computed presence of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    /// A timer is currently running.
    Working,
    /// Time was tracked in the synced range.
    Active,
    /// Enabled, but nothing tracked in the synced range.
    Idle,
    /// Disabled remotely.
    Inactive,
}

/// Fields computed locally for a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDerived {
    /// Total tracked time across the member's entries.
    pub tracked_ms: u64,
    /// Number of entries tracked by the member.
    pub entry_count: u32,
    /// Computed status.
    pub status: MemberStatus,
}

impl MemberDerived {
    /// Tracked time in hours.
    pub fn hours(&self) -> f64 {
        self.tracked_ms as f64 / 3_600_000.0
    }
}

/// Computed progress state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Nothing tracked yet.
    Open,
    /// Time has been tracked, task not closed.
    InProgress,
    /// Closed remotely.
    Done,
}

/// Fields computed locally for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDerived {
    /// Total tracked time against the task.
    pub tracked_ms: u64,
    /// `tracked / estimate`, capped at 1.0; `None` without an estimate.
    pub completion_ratio: Option<f64>,
    /// Computed status.
    pub status: TaskStatus,
}

/// Local copy of a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMember {
    /// Raw remote fields.
    pub record: Member,
    /// Derived fields.
    pub derived: MemberDerived,
    /// Last time the raw or derived fields changed (epoch millis).
    pub updated_at_ms: u64,
}

/// Local copy of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalTask {
    /// Raw remote fields.
    pub record: Task,
    /// Derived fields.
    pub derived: TaskDerived,
    /// Last time the raw or derived fields changed (epoch millis).
    pub updated_at_ms: u64,
}

/// Local copy of a time entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalTimeEntry {
    /// Raw remote fields.
    pub record: TimeEntry,
    /// Last time the record changed (epoch millis).
    pub updated_at_ms: u64,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_entry_counts_up_to_now() {
        let entry = TimeEntry {
            id: "e1".into(),
            member_id: "m1".into(),
            task_id: None,
            start_ms: 1_000,
            end_ms: None,
            description: String::new(),
        };
        assert!(entry.is_running());
        assert_eq!(entry.duration_ms(4_000), 3_000);
        // clock skew never yields a negative duration
        assert_eq!(entry.duration_ms(500), 0);
    }

    #[test]
    fn member_deserializes_with_defaults() {
        let member: Member = serde_json::from_str(r#"{"id":"m1","name":"Ada"}"#).unwrap();
        assert_eq!(member.id.as_str(), "m1");
        assert!(member.active);
        assert!(member.email.is_empty());
    }

    #[test]
    fn blank_id_is_empty() {
        assert!(ExternalId::new("  ").is_empty());
        assert!(!ExternalId::new("m1").is_empty());
    }

    #[test]
    fn hours_from_tracked_ms() {
        let derived = MemberDerived {
            tracked_ms: 5_400_000,
            entry_count: 2,
            status: MemberStatus::Active,
        };
        assert!((derived.hours() - 1.5).abs() < f64::EPSILON);
    }
}
