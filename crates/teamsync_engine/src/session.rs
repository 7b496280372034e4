//! Sync sessions and their outcomes.

use std::fmt;
use std::time::Duration;
use teamsync_model::SyncParameters;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Phase of a sync session.
///
/// Success path: `Idle → Locking → Fetching → Reconciling → Persisting →
/// Publishing → Complete`. `Aborted` and `Failed` are reachable from
/// `Fetching`, `Reconciling` and `Persisting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session running.
    Idle,
    /// Acquiring the concurrency guard.
    Locking,
    /// Calling the remote service.
    Fetching,
    /// Merging the fetched batch.
    Reconciling,
    /// Writing the merged set to the local store (the "caching" step).
    Persisting,
    /// Emitting state to subscribers.
    Publishing,
    /// Finished successfully.
    Complete,
    /// Cancelled; the store was not written.
    Aborted,
    /// Failed; the store was not written.
    Failed,
}

impl SessionPhase {
    /// Returns true for `Complete`, `Aborted` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Complete | SessionPhase::Aborted | SessionPhase::Failed
        )
    }

    /// Returns true while a session holds the guard and has not finished.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionPhase::Fetching
                | SessionPhase::Reconciling
                | SessionPhase::Persisting
                | SessionPhase::Publishing
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Locking => "locking",
            SessionPhase::Fetching => "fetching",
            SessionPhase::Reconciling => "reconciling",
            SessionPhase::Persisting => "persisting",
            SessionPhase::Publishing => "publishing",
            SessionPhase::Complete => "complete",
            SessionPhase::Aborted => "aborted",
            SessionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What asked for a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The poll timer.
    Tick,
    /// The debouncer, after parameters settled.
    ParametersChanged,
    /// The user pressed refresh.
    Manual,
    /// Connectivity came back.
    Reconnect,
    /// A historical backfill request.
    Backfill,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Tick => "tick",
            Trigger::ParametersChanged => "parameters_changed",
            Trigger::Manual => "manual",
            Trigger::Reconnect => "reconnect",
            Trigger::Backfill => "backfill",
        };
        f.write_str(name)
    }
}

/// How many task pages a session may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Regular poll, bounded by `poll_max_pages`.
    Incremental,
    /// Historical backfill, bounded by `backfill_max_pages`.
    Backfill,
}

/// One sync attempt that got past the guard.
#[derive(Debug)]
pub struct SyncSession {
    /// Session id.
    pub id: Uuid,
    /// Wall-clock start (epoch millis).
    pub started_at_ms: u64,
    /// Trigger.
    pub trigger: Trigger,
    /// Mode.
    pub mode: SyncMode,
    /// Parameters captured at start; never changes during the session.
    pub parameters: SyncParameters,
    cancel: CancellationToken,
    phase: SessionPhase,
}

impl SyncSession {
    /// Creates a session in the `Locking` phase.
    pub fn new(
        parameters: SyncParameters,
        trigger: Trigger,
        mode: SyncMode,
        started_at_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at_ms,
            trigger,
            mode,
            parameters,
            cancel: CancellationToken::new(),
            phase: SessionPhase::Locking,
        }
    }

    /// The session's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns true once the token fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, phase: SessionPhase) {
        self.phase = phase;
    }
}

/// Summary of a completed session.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Session id.
    pub session_id: Uuid,
    /// Trigger.
    pub trigger: Trigger,
    /// Members in the committed set.
    pub members: usize,
    /// Tasks in the committed set.
    pub tasks: usize,
    /// Time entries in the committed set.
    pub time_entries: usize,
    /// Task pages fetched.
    pub pages_fetched: u32,
    /// True if the page limit cut the task fetch short.
    pub truncated: bool,
    /// True if the committed set differs from the previous one.
    pub changed: bool,
    /// Digest of the committed set.
    pub digest: String,
    /// Wall time spent in the session.
    pub duration: Duration,
}

/// How a sync attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The merged set was committed and published.
    Completed(SyncReport),
    /// Another session held the guard.
    Skipped,
    /// The effective entity filter was empty.
    NothingToSync,
    /// The session was cancelled before writing.
    Aborted {
        /// Session id.
        session_id: Uuid,
    },
    /// The session failed before writing.
    Failed {
        /// Session id.
        session_id: Uuid,
        /// Error message, also published as `last_error`.
        error: String,
        /// True for connectivity failures.
        transient: bool,
    },
}

impl SessionOutcome {
    /// Returns true for `Completed`.
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }

    /// Returns the report of a completed session.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SessionOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}
