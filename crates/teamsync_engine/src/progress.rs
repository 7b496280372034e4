//! Progress and state streams consumed by the rendering layer.
//!
//! The publisher exposes two channels:
//! - a `broadcast` stream of [`ProgressReport`]s, one per step; slow
//!   subscribers lose old reports rather than blocking the engine
//! - a `watch` cell holding the latest [`DashboardState`]; readers always
//!   see the last committed entity set, never a partial one

use crate::session::SessionPhase;
use std::sync::Arc;
use teamsync_model::EntitySet;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// One progress step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    /// Emitting session.
    pub session_id: Uuid,
    /// Phase at the time of the report.
    pub phase: SessionPhase,
    /// Human-readable status line.
    pub message: String,
    /// Completion estimate, 0..=100.
    pub percent: u8,
}

/// Everything the dashboard renders besides progress.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    /// Last committed entity set.
    pub entities: Arc<EntitySet>,
    /// Wall-clock time of the last successful commit.
    pub last_sync_ms: Option<u64>,
    /// Last failure message, cleared by the next success.
    pub last_error: Option<String>,
    /// Phase of the current or last session.
    pub phase: SessionPhase,
    /// Whether the last commit carried truncated history.
    pub truncated: bool,
    /// Writes waiting in the offline queue.
    pub pending_operations: usize,
    /// Digest of `entities`.
    pub digest: Option<String>,
    /// Host-reported connectivity.
    pub online: bool,
}

impl DashboardState {
    fn initial(entities: EntitySet) -> Self {
        Self {
            digest: entities.digest().ok(),
            entities: Arc::new(entities),
            last_sync_ms: None,
            last_error: None,
            phase: SessionPhase::Idle,
            truncated: false,
            pending_operations: 0,
            online: true,
        }
    }
}

/// Fan-out of progress reports and dashboard state.
#[derive(Debug)]
pub struct Publisher {
    progress: broadcast::Sender<ProgressReport>,
    state: watch::Sender<DashboardState>,
}

impl Publisher {
    /// Creates a publisher seeded with the store's current contents.
    pub fn new(capacity: usize, entities: EntitySet) -> Self {
        let (progress, _) = broadcast::channel(capacity.max(1));
        let (state, _) = watch::channel(DashboardState::initial(entities));
        Self { progress, state }
    }

    /// Subscribes to progress reports emitted from now on.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressReport> {
        self.progress.subscribe()
    }

    /// Subscribes to dashboard state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<DashboardState> {
        self.state.subscribe()
    }

    /// Returns a copy of the current state.
    pub fn state(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    /// Emits a progress report. Having no subscribers is fine.
    pub fn progress(
        &self,
        session_id: Uuid,
        phase: SessionPhase,
        message: impl Into<String>,
        percent: u8,
    ) {
        let _ = self.progress.send(ProgressReport {
            session_id,
            phase,
            message: message.into(),
            percent: percent.min(100),
        });
    }

    /// Modifies the state in place and notifies subscribers.
    pub fn update_state(&self, modify: impl FnOnce(&mut DashboardState)) {
        self.state.send_modify(modify);
    }

    /// Number of live progress subscribers.
    pub fn progress_subscribers(&self) -> usize {
        self.progress.receiver_count()
    }
}
