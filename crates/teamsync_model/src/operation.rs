//! Write operations deferred while the remote service is unreachable.

use crate::entity::ExternalId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic order key of a pending operation.
///
/// Ids are assigned by the queue in enqueue order; replay follows the
/// same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// The remote write to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationPayload {
    /// Records a new time entry.
    CreateTimeEntry {
        /// Member tracking the time.
        member_id: ExternalId,
        /// Task tracked against.
        task_id: Option<ExternalId>,
        /// Interval start (epoch millis).
        start_ms: u64,
        /// Interval end (epoch millis); `None` starts a running timer.
        end_ms: Option<u64>,
        /// Free-form note.
        description: String,
    },
    /// Opens or closes a task.
    SetTaskDone {
        /// Target task.
        task_id: ExternalId,
        /// New state.
        done: bool,
    },
}

impl OperationPayload {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OperationPayload::CreateTimeEntry { .. } => "create_time_entry",
            OperationPayload::SetTaskDone { .. } => "set_task_done",
        }
    }
}

/// A write waiting to be replayed against the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Order key.
    pub operation_id: OperationId,
    /// The write.
    pub payload: OperationPayload,
    /// When the write was first attempted (epoch millis).
    pub created_at_ms: u64,
}
