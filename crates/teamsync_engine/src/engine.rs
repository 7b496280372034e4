//! The engine facade used by the host application.

use crate::clock::{Clock, SystemClock};
use crate::config::SyncSettings;
use crate::error::SyncResult;
use crate::executor::{SyncExecutor, SyncStats};
use crate::offline::{OfflineQueue, ReplayReport};
use crate::progress::{DashboardState, ProgressReport};
use crate::remote::RemoteApi;
use crate::session::{SessionOutcome, SyncMode, Trigger};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use teamsync_model::{
    DateRange, EntitySet, OperationId, OperationPayload, PendingOperation, SyncParameters,
};
use teamsync_store::LocalStore;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// What happened to a submitted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The remote acknowledged the write.
    Sent(OperationId),
    /// The remote was unreachable; the write waits in the offline queue.
    Queued(OperationId),
}

/// Mirrors a remote team-management service into a local cache.
///
/// The engine owns the current [`SyncParameters`], the executor and the
/// offline queue. Scheduling lives in [`crate::Scheduler`]; every method
/// here can also be driven directly.
pub struct SyncEngine<R: RemoteApi, S: LocalStore> {
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    executor: SyncExecutor<R, S>,
    parameters: RwLock<SyncParameters>,
    queue: OfflineQueue,
    online: AtomicBool,
}

impl<R: RemoteApi, S: LocalStore> SyncEngine<R, S> {
    /// Creates an engine using the system clock.
    pub fn new(settings: SyncSettings, remote: R, store: S) -> SyncResult<Self> {
        Self::with_clock(settings, remote, store, Arc::new(SystemClock))
    }

    /// Creates an engine with an explicit clock.
    pub fn with_clock(
        settings: SyncSettings,
        remote: R,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let remote = Arc::new(remote);
        let parameters = settings.initial_parameters();
        let executor =
            SyncExecutor::new(settings, Arc::clone(&remote), Arc::new(store), Arc::clone(&clock))?;
        Ok(Self {
            remote,
            clock,
            executor,
            parameters: RwLock::new(parameters),
            queue: OfflineQueue::new(),
            online: AtomicBool::new(true),
        })
    }

    /// Replaces the offline queue with a restored one.
    pub fn with_pending_operations(mut self, operations: Vec<PendingOperation>) -> Self {
        self.queue = OfflineQueue::from_pending(operations);
        let pending = self.queue.len();
        self.executor
            .publisher()
            .update_state(|state| state.pending_operations = pending);
        self
    }

    /// The settings in use.
    pub fn settings(&self) -> &SyncSettings {
        self.executor.settings()
    }

    /// The remote service.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// The local store.
    pub fn store(&self) -> &S {
        self.executor.store()
    }

    /// Current parameters.
    pub fn parameters(&self) -> SyncParameters {
        self.parameters.read().clone()
    }

    /// Replaces the parameters used by the next session.
    ///
    /// A session already running keeps the parameters it started with.
    pub fn set_parameters(&self, parameters: SyncParameters) {
        debug!(?parameters, "parameters updated");
        *self.parameters.write() = parameters;
    }

    /// Reads the local store directly.
    pub fn snapshot(&self) -> SyncResult<EntitySet> {
        Ok(self.executor.store().read_all()?)
    }

    /// Latest dashboard state.
    pub fn state(&self) -> DashboardState {
        self.executor.publisher().state()
    }

    /// Subscribes to dashboard state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<DashboardState> {
        self.executor.publisher().subscribe_state()
    }

    /// Subscribes to progress reports.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressReport> {
        self.executor.publisher().subscribe_progress()
    }

    /// Runs one incremental sync with the current parameters.
    pub async fn sync_now(&self, trigger: Trigger) -> SessionOutcome {
        let epoch = self.executor.cancel_epoch();
        let parameters = self.parameters();
        self.executor
            .run_since(epoch, parameters, trigger, SyncMode::Incremental)
            .await
    }

    /// Runs one historical sync over `range` without changing the
    /// current parameters.
    pub async fn backfill(&self, range: DateRange) -> SessionOutcome {
        info!(?range, "starting backfill");
        let epoch = self.executor.cancel_epoch();
        let parameters = self.parameters().with_date_range(range);
        self.executor
            .run_since(epoch, parameters, Trigger::Backfill, SyncMode::Backfill)
            .await
    }

    /// Cancels the in-flight session. Returns true if one was signalled.
    pub fn cancel_in_flight(&self) -> bool {
        self.executor.cancel_in_flight()
    }

    /// Returns true while a session holds the guard.
    pub fn is_syncing(&self) -> bool {
        self.executor.is_syncing()
    }

    /// Submits a write, queueing it if the remote is unreachable.
    ///
    /// While older writes are still queued the new one goes behind them and
    /// a replay is attempted, so the remote sees writes in submission order.
    /// Non-connectivity errors are returned and nothing is queued.
    pub async fn submit(&self, payload: OperationPayload) -> SyncResult<SubmitOutcome> {
        let created_at_ms = self.clock.now_ms();
        if !self.is_online() {
            let id = self.queue.enqueue(payload, created_at_ms);
            self.publish_pending();
            info!(operation_id = %id, "offline, operation queued");
            return Ok(SubmitOutcome::Queued(id));
        }

        if !self.queue.is_empty() || self.queue.is_replaying() {
            let id = self.queue.enqueue(payload, created_at_ms);
            self.publish_pending();
            debug!(operation_id = %id, "earlier writes pending, replaying in order");
            let report = self.replay_pending().await;
            return Ok(if report.replayed.contains(&id) {
                SubmitOutcome::Sent(id)
            } else {
                SubmitOutcome::Queued(id)
            });
        }

        let operation = PendingOperation {
            operation_id: self.queue.reserve_id(),
            payload,
            created_at_ms,
        };
        match self.remote.submit_operation(&operation).await {
            Ok(()) => Ok(SubmitOutcome::Sent(operation.operation_id)),
            Err(e) if e.is_transient() => {
                let id = operation.operation_id;
                warn!(operation_id = %id, error = %e, "remote unreachable, operation queued");
                self.queue.push(operation);
                self.publish_pending();
                Ok(SubmitOutcome::Queued(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Records host-reported connectivity.
    ///
    /// Returns true on an offline to online transition.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online != online {
            info!(online, "connectivity changed");
            self.executor
                .publisher()
                .update_state(|state| state.online = online);
        }
        online && !was_online
    }

    /// Host-reported connectivity.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Replays the offline queue.
    pub async fn replay_pending(&self) -> ReplayReport {
        let report = self.queue.replay(self.remote.as_ref()).await;
        self.publish_pending();
        report
    }

    /// Replays the offline queue, then syncs.
    ///
    /// Replay failures do not prevent the sync.
    pub async fn handle_reconnect(&self) -> (ReplayReport, SessionOutcome) {
        let report = self.replay_pending().await;
        let outcome = self.sync_now(Trigger::Reconnect).await;
        (report, outcome)
    }

    /// Queued writes in replay order.
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.queue.pending()
    }

    /// Empties the local store.
    ///
    /// Returns false, leaving the store as is, if a session is running.
    pub fn clear_cache(&self) -> SyncResult<bool> {
        let Some(_permit) = self.executor.guard().try_lock() else {
            debug!("sync in progress, cache not cleared");
            return Ok(false);
        };
        self.executor.store().clear()?;
        self.executor.publisher().update_state(|state| {
            state.entities = Arc::new(EntitySet::new());
            state.digest = EntitySet::new().digest().ok();
            state.last_sync_ms = None;
            state.truncated = false;
        });
        info!("local cache cleared");
        Ok(true)
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.executor.stats()
    }

    fn publish_pending(&self) {
        let pending = self.queue.len();
        self.executor
            .publisher()
            .update_state(|state| state.pending_operations = pending);
    }
}
