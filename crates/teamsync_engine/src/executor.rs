//! The sync session state machine.

use crate::clock::Clock;
use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{FetchStop, Page, RateLimitedFetcher};
use crate::guard::ConcurrencyGuard;
use crate::progress::Publisher;
use crate::reconcile::{reconcile, StandardDerivation};
use crate::remote::RemoteApi;
use crate::session::{SessionOutcome, SessionPhase, SyncMode, SyncReport, SyncSession, Trigger};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use teamsync_model::{EntityFilter, RemoteBatch, SyncParameters};
use teamsync_store::LocalStore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Statistics about sync attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Attempts started, including skipped ones.
    pub attempts: u64,
    /// Sessions that committed.
    pub completed: u64,
    /// Attempts refused by the guard.
    pub skipped: u64,
    /// Sessions cancelled before writing.
    pub aborted: u64,
    /// Sessions that failed before writing.
    pub failed: u64,
    /// Attempts with an empty effective filter.
    pub nothing_to_sync: u64,
    /// Commits that hit the page limit.
    pub truncated: u64,
    /// In-flight sessions cancelled by a caller.
    pub cancellations: u64,
    /// Task pages fetched over all sessions.
    pub pages_fetched: u64,
    /// Time of the last commit (epoch millis).
    pub last_sync_ms: Option<u64>,
    /// Last failure message.
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct ActiveSession {
    id: Uuid,
    cancel: CancellationToken,
}

/// Runs sync sessions against a remote and a local store.
///
/// At most one session is past [`SessionPhase::Locking`] at any time; a
/// second attempt is skipped, never queued. A cancelled or failed session
/// never writes to the store.
pub struct SyncExecutor<R: RemoteApi, S: LocalStore> {
    settings: SyncSettings,
    remote: Arc<R>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    guard: ConcurrencyGuard,
    publisher: Publisher,
    stats: RwLock<SyncStats>,
    active: Mutex<Option<ActiveSession>>,
    // Bumped by every cancel request; guarded by `active`.
    cancel_epoch: AtomicU64,
}

impl<R: RemoteApi, S: LocalStore> SyncExecutor<R, S> {
    /// Creates an executor. The publisher is seeded with the store contents.
    pub fn new(
        settings: SyncSettings,
        remote: Arc<R>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        settings.validate()?;
        let cached = store.read_all()?;
        debug!(records = cached.len(), "seeding dashboard state from local store");
        Ok(Self {
            publisher: Publisher::new(settings.progress_capacity, cached),
            settings,
            remote,
            store,
            clock,
            guard: ConcurrencyGuard::new(),
            stats: RwLock::new(SyncStats::default()),
            active: Mutex::new(None),
            cancel_epoch: AtomicU64::new(0),
        })
    }

    /// The settings in use.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// The state and progress publisher.
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// The concurrency guard shared by every session.
    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    /// The local store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a session holds the guard.
    pub fn is_syncing(&self) -> bool {
        self.guard.is_held()
    }

    /// Cancels the in-flight session, if any.
    ///
    /// Returns true if a live session was signalled. Cancelling an already
    /// cancelled session returns false. An attempt that started from an
    /// earlier [`SyncExecutor::cancel_epoch`] but has not registered yet is
    /// aborted as soon as it passes the guard.
    pub fn cancel_in_flight(&self) -> bool {
        let active = self.active.lock();
        self.cancel_epoch.fetch_add(1, Ordering::SeqCst);
        match active.as_ref() {
            Some(session) if !session.cancel.is_cancelled() => {
                session.cancel.cancel();
                self.stats.write().cancellations += 1;
                info!(session = %session.id, "cancelling in-flight sync");
                true
            }
            _ => false,
        }
    }

    /// Number of cancel requests so far.
    ///
    /// Read it before reading the parameters handed to
    /// [`SyncExecutor::run_since`].
    pub fn cancel_epoch(&self) -> u64 {
        self.cancel_epoch.load(Ordering::SeqCst)
    }

    /// Runs one sync attempt with `parameters`.
    pub async fn run(
        &self,
        parameters: SyncParameters,
        trigger: Trigger,
        mode: SyncMode,
    ) -> SessionOutcome {
        let epoch = self.cancel_epoch();
        self.run_since(epoch, parameters, trigger, mode).await
    }

    /// Runs one sync attempt with `parameters` read at `epoch`.
    ///
    /// If a cancel request came in after `epoch`, the session is aborted
    /// right after taking the guard.
    pub async fn run_since(
        &self,
        epoch: u64,
        parameters: SyncParameters,
        trigger: Trigger,
        mode: SyncMode,
    ) -> SessionOutcome {
        self.stats.write().attempts += 1;

        let filter = self.settings.effective_filter(&parameters.entity_filter);
        if filter.is_empty() {
            debug!(%trigger, "effective entity filter is empty, nothing to sync");
            self.stats.write().nothing_to_sync += 1;
            return SessionOutcome::NothingToSync;
        }

        let mut session = SyncSession::new(parameters, trigger, mode, self.clock.now_ms());
        let permit = {
            let mut active = self.active.lock();
            let Some(permit) = self.guard.try_lock() else {
                drop(active);
                info!(%trigger, "sync already in progress, skipping attempt");
                self.stats.write().skipped += 1;
                return SessionOutcome::Skipped;
            };
            if self.cancel_epoch.load(Ordering::SeqCst) != epoch {
                debug!(session = %session.id, "parameters changed before start");
                session.cancellation_token().cancel();
            }
            *active = Some(ActiveSession {
                id: session.id,
                cancel: session.cancellation_token().clone(),
            });
            permit
        };

        debug!(session = %session.id, %trigger, mode = ?session.mode, "guard acquired");
        self.publisher.update_state(|state| state.phase = SessionPhase::Locking);
        self.report(&session, "Starting sync", 0);

        let span = info_span!("sync_session", session = %session.id, %trigger);
        let started = Instant::now();
        let result = self
            .execute(&mut session, &filter, started)
            .instrument(span)
            .await;

        self.clear_active(session.id);
        drop(permit);

        match result {
            Ok(report) => {
                self.enter(&mut session, SessionPhase::Complete);
                let message = if report.truncated {
                    format!(
                        "Synced {} records (task history truncated after {} pages)",
                        report.members + report.tasks + report.time_entries,
                        report.pages_fetched
                    )
                } else {
                    format!(
                        "Synced {} records",
                        report.members + report.tasks + report.time_entries
                    )
                };
                self.publisher
                    .progress(session.id, SessionPhase::Complete, message, 100);
                info!(
                    session = %session.id,
                    changed = report.changed,
                    truncated = report.truncated,
                    elapsed_ms = report.duration.as_millis() as u64,
                    "sync complete"
                );
                SessionOutcome::Completed(report)
            }
            Err(SyncError::Cancelled) => {
                self.enter(&mut session, SessionPhase::Aborted);
                self.stats.write().aborted += 1;
                self.publisher
                    .progress(session.id, SessionPhase::Aborted, "Sync cancelled", 0);
                info!(session = %session.id, "sync aborted, store untouched");
                SessionOutcome::Aborted {
                    session_id: session.id,
                }
            }
            Err(e) => {
                let message = e.to_string();
                let transient = e.is_transient();
                {
                    let mut stats = self.stats.write();
                    stats.failed += 1;
                    stats.last_error = Some(message.clone());
                }
                session.advance(SessionPhase::Failed);
                self.publisher.update_state(|state| {
                    state.phase = SessionPhase::Failed;
                    state.last_error = Some(message.clone());
                });
                self.publisher.progress(
                    session.id,
                    SessionPhase::Failed,
                    format!("Sync failed: {message}"),
                    0,
                );
                if transient {
                    warn!(session = %session.id, error = %message, "sync failed, remote unreachable");
                } else {
                    warn!(session = %session.id, error = %message, "sync failed");
                }
                SessionOutcome::Failed {
                    session_id: session.id,
                    error: message,
                    transient,
                }
            }
        }
    }

    async fn execute(
        &self,
        session: &mut SyncSession,
        filter: &EntityFilter,
        started: Instant,
    ) -> SyncResult<SyncReport> {
        let cancel = session.cancellation_token().clone();
        let (start_ms, end_ms) = session.parameters.date_range.resolve(session.started_at_ms);

        self.enter(session, SessionPhase::Fetching);
        self.report(session, "Fetching members", 5);
        let members = cancellable(&cancel, self.remote.list_entities(filter)).await?;

        self.report(
            session,
            format!("Fetched {} members, loading time entries", members.len()),
            15,
        );
        let member_ids = filter.to_vec();
        let time_entries = cancellable(
            &cancel,
            self.remote.list_time_entries(start_ms, end_ms, &member_ids),
        )
        .await?;

        self.report(session, "Loading tasks", 30);
        let fetcher = RateLimitedFetcher::new(
            self.max_pages(session.mode),
            self.settings.inter_page_delay(),
        );
        let session_id = session.id;
        let remote = &self.remote;
        let publisher = &self.publisher;
        let fetched = fetcher
            .fetch_all(
                |page| async move {
                    remote
                        .list_tasks_page(filter, page)
                        .await
                        .map(|p| Page {
                            items: p.tasks,
                            has_more: p.has_more,
                        })
                },
                &cancel,
                |p| {
                    let percent = 30 + u32::from(p.percent) * 40 / 100;
                    publisher.progress(
                        session_id,
                        SessionPhase::Fetching,
                        format!("Loaded task page {}/{}", p.pages_fetched, p.max_pages),
                        percent as u8,
                    );
                },
            )
            .await;

        self.stats.write().pages_fetched += u64::from(fetched.pages_fetched);
        let pages_fetched = fetched.pages_fetched;
        let truncated = match fetched.stop {
            FetchStop::Exhausted => false,
            FetchStop::PageLimit => {
                warn!(pages = pages_fetched, "task history truncated at page limit");
                true
            }
            FetchStop::Cancelled => return Err(SyncError::Cancelled),
            FetchStop::Failed(e) => return Err(e),
        };

        let batch = RemoteBatch {
            members,
            tasks: fetched.records,
            time_entries,
        };
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.enter(session, SessionPhase::Reconciling);
        self.report(session, format!("Reconciling {} records", batch.len()), 75);
        let local = self.store.read_all()?;
        let now_ms = self.clock.now_ms();
        let merged = reconcile(
            &local,
            &batch,
            &StandardDerivation::new(start_ms, end_ms),
            now_ms,
        )?;
        let digest = merged.digest()?;
        let changed = merged != local;

        // Last point at which a superseded session can still back out.
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.enter(session, SessionPhase::Persisting);
        self.report(session, "Saving to local cache", 90);
        self.store.bulk_upsert(&merged)?;

        self.enter(session, SessionPhase::Publishing);
        let report = SyncReport {
            session_id: session.id,
            trigger: session.trigger,
            members: merged.members.len(),
            tasks: merged.tasks.len(),
            time_entries: merged.time_entries.len(),
            pages_fetched,
            truncated,
            changed,
            digest: digest.clone(),
            duration: started.elapsed(),
        };

        let entities = Arc::new(merged);
        self.publisher.update_state(|state| {
            state.entities = entities;
            state.last_sync_ms = Some(now_ms);
            state.last_error = None;
            state.truncated = truncated;
            state.digest = Some(digest);
        });
        {
            let mut stats = self.stats.write();
            stats.completed += 1;
            if truncated {
                stats.truncated += 1;
            }
            stats.last_sync_ms = Some(now_ms);
            stats.last_error = None;
        }

        Ok(report)
    }

    fn max_pages(&self, mode: SyncMode) -> u32 {
        match mode {
            SyncMode::Incremental => self.settings.poll_max_pages,
            SyncMode::Backfill => self.settings.backfill_max_pages,
        }
    }

    fn enter(&self, session: &mut SyncSession, phase: SessionPhase) {
        debug!(session = %session.id, from = %session.phase(), to = %phase, "phase transition");
        session.advance(phase);
        self.publisher.update_state(|state| state.phase = phase);
    }

    fn report(&self, session: &SyncSession, message: impl Into<String>, percent: u8) {
        self.publisher
            .progress(session.id, session.phase(), message, percent);
    }

    fn clear_active(&self, id: Uuid) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
        }
    }
}

/// Races `future` against `cancel`.
async fn cancellable<T>(
    cancel: &CancellationToken,
    future: impl Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::remote::{MockRemote, RemoteCall};
    use std::time::Duration;
    use teamsync_model::{DateRange, EntityFilter, ExternalId, Member, MemberStatus, Task};
    use teamsync_store::InMemoryStore;
    use teamsync_testkit::fixtures::{entry, HOUR_MS};

    const NOW: u64 = 1_700_000_000_000;

    fn settings() -> SyncSettings {
        SyncSettings::new().with_inter_page_delay(Duration::ZERO)
    }

    fn params(ids: &[&str]) -> SyncParameters {
        let filter: EntityFilter = ids.iter().copied().collect();
        SyncParameters::new(filter)
            .with_date_range(DateRange::between(NOW - 2 * HOUR_MS, NOW + HOUR_MS).unwrap())
    }

    fn executor(remote: MockRemote) -> SyncExecutor<MockRemote, InMemoryStore> {
        SyncExecutor::new(
            settings(),
            Arc::new(remote),
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap()
    }

    fn seeded_remote() -> MockRemote {
        let remote = MockRemote::new();
        remote.set_members(vec![Member::new("m1", "Ada"), Member::new("m2", "Grace")]);
        remote.set_time_entries(vec![entry("e1", "m1", Some("t1"), NOW - HOUR_MS, None)]);
        remote.set_task_pages(vec![vec![Task::new("t1", "Design")], vec![Task::new("t2", "Build")]]);
        remote
    }

    #[tokio::test]
    async fn successful_session_commits_and_publishes() {
        let exec = executor(seeded_remote());
        let mut progress = exec.publisher().subscribe_progress();

        let outcome = exec
            .run(params(&["m1"]), Trigger::Manual, SyncMode::Incremental)
            .await;

        let report = outcome.report().unwrap();
        assert_eq!(report.members, 1);
        assert_eq!(report.tasks, 2);
        assert_eq!(report.pages_fetched, 2);
        assert!(!report.truncated);
        assert!(report.changed);

        let stored = exec.store().read_all().unwrap();
        assert_eq!(
            stored.member(&ExternalId::new("m1")).unwrap().derived.status,
            MemberStatus::Working
        );

        let state = exec.publisher().state();
        assert_eq!(state.phase, SessionPhase::Complete);
        assert_eq!(state.last_sync_ms, Some(NOW));
        assert_eq!(state.digest.as_deref(), Some(report.digest.as_str()));
        assert!(!exec.is_syncing());

        let mut last = None;
        while let Ok(p) = progress.try_recv() {
            last = Some(p);
        }
        let last = last.unwrap();
        assert_eq!(last.phase, SessionPhase::Complete);
        assert_eq!(last.percent, 100);
    }

    #[tokio::test]
    async fn empty_filter_is_nothing_to_sync() {
        let exec = executor(seeded_remote());
        let outcome = exec
            .run(params(&[]), Trigger::Tick, SyncMode::Incremental)
            .await;

        assert_eq!(outcome, SessionOutcome::NothingToSync);
        assert_eq!(exec.stats().nothing_to_sync, 1);
        assert_eq!(exec.store().write_count(), 0);
    }

    #[tokio::test]
    async fn held_guard_skips_attempt() {
        let remote = seeded_remote();
        let exec = executor(remote);
        let _permit = exec.guard().try_lock().unwrap();

        let outcome = exec
            .run(params(&["m1"]), Trigger::Tick, SyncMode::Incremental)
            .await;
        assert_eq!(outcome, SessionOutcome::Skipped);
        assert_eq!(exec.stats().skipped, 1);
        assert_eq!(exec.store().write_count(), 0);
    }

    #[tokio::test]
    async fn failure_leaves_store_untouched() {
        let remote = seeded_remote();
        remote.fail_task_page_once(2);
        let exec = executor(remote);

        let outcome = exec
            .run(params(&["m1"]), Trigger::Tick, SyncMode::Incremental)
            .await;

        match outcome {
            SessionOutcome::Failed { transient, .. } => assert!(transient),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(exec.store().write_count(), 0);
        let state = exec.publisher().state();
        assert_eq!(state.phase, SessionPhase::Failed);
        assert!(state.last_error.is_some());
        assert!(!exec.is_syncing());
    }

    #[tokio::test]
    async fn page_limit_truncates_but_commits() {
        let remote = seeded_remote();
        remote.set_endless_task_pages(2);
        let exec = SyncExecutor::new(
            settings().with_poll_max_pages(3),
            Arc::new(remote),
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap();

        let outcome = exec
            .run(params(&["m1"]), Trigger::Tick, SyncMode::Incremental)
            .await;
        let report = outcome.report().unwrap();
        assert!(report.truncated);
        assert_eq!(report.tasks, 6);
        assert!(exec.publisher().state().truncated);
        assert_eq!(exec.stats().truncated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_session_aborts_without_writing() {
        let remote = seeded_remote();
        remote.set_latency(Duration::from_secs(5));
        let exec = Arc::new(executor(remote));

        let runner = Arc::clone(&exec);
        let handle = tokio::spawn(async move {
            runner
                .run(params(&["m1"]), Trigger::Tick, SyncMode::Incremental)
                .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(exec.is_syncing());
        assert!(exec.cancel_in_flight());
        assert!(!exec.cancel_in_flight());

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Aborted { .. }));
        assert_eq!(exec.store().write_count(), 0);
        assert_eq!(exec.stats().cancellations, 1);
        assert!(!exec.is_syncing());
    }

    #[tokio::test]
    async fn backfill_uses_backfill_limit() {
        let remote = seeded_remote();
        remote.set_endless_task_pages(1);
        let exec = SyncExecutor::new(
            settings().with_poll_max_pages(2).with_backfill_max_pages(5),
            Arc::new(remote),
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap();

        let outcome = exec
            .run(params(&["m1"]), Trigger::Backfill, SyncMode::Backfill)
            .await;
        assert_eq!(outcome.report().unwrap().pages_fetched, 5);
    }

    #[tokio::test]
    async fn allowlist_limits_requested_members() {
        let remote = seeded_remote();
        let exec = SyncExecutor::new(
            settings().with_monitored_members(["m2"].into_iter().collect()),
            Arc::new(remote),
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap();

        assert_eq!(
            exec.run(params(&["m1"]), Trigger::Tick, SyncMode::Incremental)
                .await,
            SessionOutcome::NothingToSync
        );

        let outcome = exec
            .run(params(&["m1", "m2"]), Trigger::Tick, SyncMode::Incremental)
            .await;
        let stored = exec.store().read_all().unwrap();
        assert!(outcome.is_completed());
        assert!(stored.member(&ExternalId::new("m2")).is_some());
        assert!(stored.member(&ExternalId::new("m1")).is_none());
    }

    #[tokio::test]
    async fn date_range_is_forwarded() {
        let remote = Arc::new(seeded_remote());
        let exec = SyncExecutor::new(
            settings(),
            Arc::clone(&remote),
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap();

        exec.run(params(&["m1"]), Trigger::Tick, SyncMode::Incremental)
            .await;
        assert!(remote.calls().contains(&RemoteCall::ListTimeEntries {
            start_ms: NOW - 2 * HOUR_MS,
            end_ms: NOW + HOUR_MS,
        }));
    }

    #[tokio::test]
    async fn first_report_is_locking() {
        let exec = executor(seeded_remote());
        let mut progress = exec.publisher().subscribe_progress();

        exec.run(params(&["m1"]), Trigger::Manual, SyncMode::Incremental)
            .await;

        let first = progress.try_recv().unwrap();
        assert_eq!(first.phase, SessionPhase::Locking);
        let second = progress.try_recv().unwrap();
        assert_eq!(second.phase, SessionPhase::Fetching);
    }

    #[tokio::test]
    async fn cancel_before_registration_aborts_session() {
        let remote = Arc::new(seeded_remote());
        let exec = SyncExecutor::new(
            settings(),
            Arc::clone(&remote),
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap();

        let epoch = exec.cancel_epoch();
        assert!(!exec.cancel_in_flight());
        assert_eq!(exec.cancel_epoch(), epoch + 1);

        let outcome = exec
            .run_since(epoch, params(&["m1"]), Trigger::Tick, SyncMode::Incremental)
            .await;
        assert!(matches!(outcome, SessionOutcome::Aborted { .. }));
        assert!(remote.calls().is_empty());
        assert_eq!(exec.store().write_count(), 0);
        assert!(!exec.is_syncing());

        let outcome = exec
            .run(params(&["m1"]), Trigger::Tick, SyncMode::Incremental)
            .await;
        assert!(outcome.is_completed());
    }
}
