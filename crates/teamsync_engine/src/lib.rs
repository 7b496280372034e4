//! # teamsync engine
//!
//! Keeps a local cache of a remote team-management service in step with
//! the dashboard's current filter and date range.
//!
//! This crate provides:
//! - Sync session state machine (locking → fetching → reconciling →
//!   persisting → publishing)
//! - Rate-limited, cancellable pagination
//! - Reconciliation of remote batches with derived summary fields
//! - A non-queuing concurrency guard
//! - Poll scheduling with debounced parameter changes
//! - An offline queue replayed on reconnect
//!
//! ## Architecture
//!
//! The remote service is authoritative. Each session fetches a batch,
//! merges it into the cached set, writes the result in one call and then
//! publishes it. Subscribers only ever see committed sets.
//!
//! ## Key Invariants
//!
//! - At most one session is past the guard at a time
//! - A cancelled or failed session never writes to the store
//! - Reconciling the same batch twice yields the same set
//! - Parameters are read once per session
//! - Queued writes replay in order, each removed only once acknowledged

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod engine;
mod error;
mod executor;
mod fetcher;
mod guard;
mod http;
mod offline;
mod progress;
mod reconcile;
mod remote;
mod scheduler;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncSettings;
pub use engine::{SubmitOutcome, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use executor::{SyncExecutor, SyncStats};
pub use fetcher::{FetchOutcome, FetchProgress, FetchStop, Page, RateLimitedFetcher};
pub use guard::{ConcurrencyGuard, GuardPermit};
pub use http::{HttpClient, HttpRemote};
pub use offline::{OfflineQueue, ReplayHalt, ReplayReport};
pub use progress::{DashboardState, ProgressReport, Publisher};
pub use reconcile::{reconcile, Derivation, ReconcileError, ReconcileResult, StandardDerivation};
pub use remote::{MockRemote, RemoteApi, RemoteCall, TaskPage};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use session::{SessionOutcome, SessionPhase, SyncMode, SyncReport, SyncSession, Trigger};
