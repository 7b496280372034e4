//! Drives sync attempts from the poll timer, parameter changes and
//! connectivity events.
//!
//! The scheduler runs as one tokio task owning:
//! - a poll interval, paused while the dashboard is hidden or a
//!   parameter change is being debounced
//! - a debounce timer restarted by every parameter change
//! - the set of spawned sync attempts
//!
//! A refresh or reconnect arriving while a parameter change is pending is
//! folded into the debounced attempt, which always runs with the latest
//! parameters.
//!
//! Attempts are spawned rather than awaited so the loop keeps reacting to
//! commands (a parameter change must be able to cancel a running session).

use crate::engine::SyncEngine;
use crate::remote::RemoteApi;
use crate::session::{SessionOutcome, Trigger};
use std::sync::Arc;
use std::time::Duration;
use teamsync_model::SyncParameters;
use teamsync_store::LocalStore;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum Command {
    Parameters(SyncParameters),
    Visible(bool),
    Online(bool),
    Refresh,
}

/// Spawns the scheduling loop for an engine.
pub struct Scheduler;

impl Scheduler {
    /// Starts scheduling on the current tokio runtime.
    ///
    /// The first tick fires one poll interval after the call.
    pub fn spawn<R, S>(engine: Arc<SyncEngine<R, S>>) -> SchedulerHandle
    where
        R: RemoteApi + 'static,
        S: LocalStore + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_loop(engine, rx, shutdown.clone()));
        SchedulerHandle {
            commands,
            shutdown,
            task,
        }
    }
}

/// Control surface of a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Reports a parameter change.
    ///
    /// The in-flight session is cancelled at once; a new session with the
    /// latest parameters starts after the debounce window stays quiet.
    pub fn update_parameters(&self, parameters: SyncParameters) {
        self.send(Command::Parameters(parameters));
    }

    /// Reports dashboard visibility. Ticks are paused while hidden.
    pub fn set_visible(&self, visible: bool) {
        self.send(Command::Visible(visible));
    }

    /// Reports connectivity. Going back online replays the offline queue
    /// and then syncs.
    pub fn set_online(&self, online: bool) {
        self.send(Command::Online(online));
    }

    /// Requests an immediate sync.
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    /// Returns true until the loop exits.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the loop, cancels the in-flight session and waits for spawned
    /// attempts to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("scheduler stopped, command dropped");
        }
    }
}

fn poll_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn spawn_sync<R, S>(attempts: &mut JoinSet<()>, engine: &Arc<SyncEngine<R, S>>, trigger: Trigger)
where
    R: RemoteApi + 'static,
    S: LocalStore + 'static,
{
    let engine = Arc::clone(engine);
    attempts.spawn(async move {
        match engine.sync_now(trigger).await {
            SessionOutcome::Completed(_) | SessionOutcome::Aborted { .. } => {}
            outcome => debug!(%trigger, ?outcome, "sync attempt did not commit"),
        }
    });
}

fn spawn_reconnect<R, S>(attempts: &mut JoinSet<()>, engine: &Arc<SyncEngine<R, S>>)
where
    R: RemoteApi + 'static,
    S: LocalStore + 'static,
{
    let engine = Arc::clone(engine);
    attempts.spawn(async move {
        let (report, _) = engine.handle_reconnect().await;
        debug!(replayed = report.replayed.len(), "reconnect handled");
    });
}

/// Sync work owed once the debounce window closes.
#[derive(Debug, Default)]
struct Debounced {
    parameters: Option<SyncParameters>,
    // Parameters applied, waiting for a superseded session to release the guard.
    deferred: bool,
    // A reconnect arrived during the window; replay before the attempt.
    reconnect: bool,
}

impl Debounced {
    fn is_open(&self) -> bool {
        self.parameters.is_some() || self.deferred
    }
}

fn launch_debounced<R, S>(
    attempts: &mut JoinSet<()>,
    engine: &Arc<SyncEngine<R, S>>,
    debounced: &mut Debounced,
) where
    R: RemoteApi + 'static,
    S: LocalStore + 'static,
{
    debounced.deferred = false;
    if std::mem::take(&mut debounced.reconnect) {
        spawn_reconnect(attempts, engine);
    } else {
        spawn_sync(attempts, engine, Trigger::ParametersChanged);
    }
}

async fn run_loop<R, S>(
    engine: Arc<SyncEngine<R, S>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
) where
    R: RemoteApi + 'static,
    S: LocalStore + 'static,
{
    let window = engine.settings().debounce();
    let mut period = engine.parameters().poll_interval();
    let mut ticker = poll_ticker(period);
    let mut visible = true;
    let mut debounced = Debounced::default();
    let mut attempts = JoinSet::new();

    let debounce = tokio::time::sleep(window);
    tokio::pin!(debounce);

    info!(poll_ms = period.as_millis() as u64, "scheduler started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            command = commands.recv() => match command {
                None => break,
                Some(Command::Parameters(parameters)) => {
                    engine.cancel_in_flight();
                    debounced.parameters = Some(parameters);
                    debounce.as_mut().reset(Instant::now() + window);
                }
                Some(Command::Visible(now_visible)) => {
                    if now_visible && !visible {
                        debug!("dashboard visible, resuming ticks");
                        ticker.reset();
                    } else if !now_visible && visible {
                        debug!("dashboard hidden, pausing ticks");
                    }
                    visible = now_visible;
                }
                Some(Command::Online(online)) => {
                    if engine.set_online(online) {
                        if debounced.is_open() {
                            debug!("reconnect folded into pending parameter change");
                            debounced.reconnect = true;
                        } else {
                            spawn_reconnect(&mut attempts, &engine);
                        }
                    }
                }
                Some(Command::Refresh) => {
                    if debounced.is_open() {
                        debug!("refresh folded into pending parameter change");
                    } else {
                        spawn_sync(&mut attempts, &engine, Trigger::Manual);
                    }
                }
            },

            _ = &mut debounce, if debounced.parameters.is_some() => {
                if let Some(parameters) = debounced.parameters.take() {
                    let next_period = parameters.poll_interval();
                    engine.set_parameters(parameters);
                    if next_period != period {
                        debug!(poll_ms = next_period.as_millis() as u64, "poll interval changed");
                        period = next_period;
                        ticker = poll_ticker(period);
                    } else {
                        ticker.reset();
                    }
                    if engine.is_syncing() && !attempts.is_empty() {
                        debug!("superseded session still running, deferring attempt");
                        engine.cancel_in_flight();
                        debounced.deferred = true;
                    } else {
                        launch_debounced(&mut attempts, &engine, &mut debounced);
                    }
                }
            }

            // A pending debounce supersedes the tick.
            _ = ticker.tick(), if visible && !debounced.is_open() => {
                spawn_sync(&mut attempts, &engine, Trigger::Tick);
            }

            Some(result) = attempts.join_next(), if !attempts.is_empty() => {
                if let Err(e) = result {
                    warn!(error = %e, "sync attempt task failed");
                }
                if debounced.deferred
                    && debounced.parameters.is_none()
                    && (!engine.is_syncing() || attempts.is_empty())
                {
                    launch_debounced(&mut attempts, &engine, &mut debounced);
                }
            }
        }
    }

    engine.cancel_in_flight();
    while let Some(result) = attempts.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "sync attempt task failed");
        }
    }
    info!("scheduler stopped");
}
