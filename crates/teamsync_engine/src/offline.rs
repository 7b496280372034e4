//! Offline recovery queue.
//!
//! Writes attempted while the remote is unreachable are held here in
//! operation-id order and replayed once connectivity returns. An entry is
//! removed only after the remote acknowledges it, so a failed replay leaves
//! it (and everything behind it) queued for the next attempt.

use crate::guard::ConcurrencyGuard;
use crate::remote::RemoteApi;
use parking_lot::Mutex;
use std::collections::VecDeque;
use teamsync_model::{OperationId, OperationPayload, PendingOperation};
use tracing::{debug, info, warn};

/// Where a replay stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayHalt {
    /// The operation the remote rejected. It stays at the head of the queue.
    pub operation_id: OperationId,
    /// The rejection.
    pub error: String,
}

/// Result of [`OfflineQueue::replay`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Acknowledged operations, in replay order.
    pub replayed: Vec<OperationId>,
    /// Operations still queued.
    pub remaining: usize,
    /// Set if a submission failed.
    pub halted: Option<ReplayHalt>,
    /// True if another replay was running and this call did nothing.
    pub already_running: bool,
}

impl ReplayReport {
    /// Returns true if the queue was drained.
    pub fn is_drained(&self) -> bool {
        !self.already_running && self.halted.is_none() && self.remaining == 0
    }
}

#[derive(Debug)]
struct QueueState {
    entries: VecDeque<PendingOperation>,
    next_id: u64,
}

/// FIFO of writes awaiting replay.
#[derive(Debug)]
pub struct OfflineQueue {
    state: Mutex<QueueState>,
    replaying: ConcurrencyGuard,
}

impl Default for OfflineQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                next_id: 1,
            }),
            replaying: ConcurrencyGuard::new(),
        }
    }

    /// Restores a queue from a snapshot taken with [`OfflineQueue::pending`].
    ///
    /// New ids continue after the highest restored one.
    pub fn from_pending(mut operations: Vec<PendingOperation>) -> Self {
        operations.sort_by_key(|op| op.operation_id);
        operations.dedup_by_key(|op| op.operation_id);
        let next_id = operations
            .last()
            .map_or(1, |op| op.operation_id.0 + 1);
        Self {
            state: Mutex::new(QueueState {
                entries: operations.into(),
                next_id,
            }),
            replaying: ConcurrencyGuard::new(),
        }
    }

    /// Allocates the next operation id without queueing anything.
    pub fn reserve_id(&self) -> OperationId {
        let mut state = self.state.lock();
        let id = OperationId(state.next_id);
        state.next_id += 1;
        id
    }

    /// Queues a new write and returns its id.
    pub fn enqueue(&self, payload: OperationPayload, created_at_ms: u64) -> OperationId {
        let mut state = self.state.lock();
        let operation_id = OperationId(state.next_id);
        state.next_id += 1;
        state.entries.push_back(PendingOperation {
            operation_id,
            payload,
            created_at_ms,
        });
        debug!(%operation_id, queued = state.entries.len(), "operation queued");
        operation_id
    }

    /// Queues an operation whose id was reserved earlier, keeping id order.
    pub fn push(&self, operation: PendingOperation) {
        let mut state = self.state.lock();
        state.next_id = state.next_id.max(operation.operation_id.0 + 1);
        let position = state
            .entries
            .iter()
            .position(|queued| queued.operation_id > operation.operation_id)
            .unwrap_or(state.entries.len());
        debug!(operation_id = %operation.operation_id, position, "operation queued");
        state.entries.insert(position, operation);
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Copies the queue contents in replay order.
    pub fn pending(&self) -> Vec<PendingOperation> {
        self.state.lock().entries.iter().cloned().collect()
    }

    /// Returns true while a replay is running.
    pub fn is_replaying(&self) -> bool {
        self.replaying.is_held()
    }

    /// Submits queued operations in order until the queue is empty or a
    /// submission fails.
    ///
    /// Only one replay runs at a time; a concurrent call returns at once
    /// with `already_running` set.
    pub async fn replay<R: RemoteApi + ?Sized>(&self, remote: &R) -> ReplayReport {
        let Some(_permit) = self.replaying.try_lock() else {
            debug!("replay already running");
            return ReplayReport {
                remaining: self.len(),
                already_running: true,
                ..ReplayReport::default()
            };
        };

        let mut report = ReplayReport::default();
        loop {
            let Some(head) = self.state.lock().entries.front().cloned() else {
                break;
            };

            match remote.submit_operation(&head).await {
                Ok(()) => {
                    self.acknowledge(head.operation_id);
                    debug!(operation_id = %head.operation_id, kind = head.payload.kind(), "operation replayed");
                    report.replayed.push(head.operation_id);
                }
                Err(e) => {
                    warn!(operation_id = %head.operation_id, error = %e, "replay halted");
                    report.halted = Some(ReplayHalt {
                        operation_id: head.operation_id,
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }

        report.remaining = self.len();
        if !report.replayed.is_empty() || report.halted.is_some() {
            info!(
                replayed = report.replayed.len(),
                remaining = report.remaining,
                "offline queue replay finished"
            );
        }
        report
    }

    fn acknowledge(&self, operation_id: OperationId) {
        let mut state = self.state.lock();
        if let Some(position) = state
            .entries
            .iter()
            .position(|op| op.operation_id == operation_id)
        {
            state.entries.remove(position);
        }
    }
}
