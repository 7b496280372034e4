//! Settings consumed by the sync engine.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use teamsync_model::{EntityFilter, SyncParameters};

/// Engine settings.
///
/// The engine only reads these; editing happens in the host application.
/// Every field has a default so partial JSON documents load cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Members the dashboard may monitor. Empty means no restriction.
    pub monitored_members: EntityFilter,
    /// Interval between scheduled ticks.
    pub poll_interval_ms: u64,
    /// Quiet period after the last parameter change before syncing.
    pub debounce_ms: u64,
    /// Page limit for regular polls.
    pub poll_max_pages: u32,
    /// Page limit for historical backfills.
    pub backfill_max_pages: u32,
    /// Delay between consecutive page requests.
    pub inter_page_delay_ms: u64,
    /// Buffered progress reports per subscriber.
    pub progress_capacity: usize,
}

impl SyncSettings {
    /// Creates settings with defaults.
    pub fn new() -> Self {
        Self {
            monitored_members: EntityFilter::new(),
            poll_interval_ms: 30_000,
            debounce_ms: 300,
            poll_max_pages: 10,
            backfill_max_pages: 100,
            inter_page_delay_ms: 250,
            progress_capacity: 64,
        }
    }

    /// Parses settings from a JSON document.
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a JSON file.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Checks that intervals and limits are usable.
    pub fn validate(&self) -> SyncResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(SyncError::Config("poll_interval_ms must be positive".into()));
        }
        if self.poll_max_pages == 0 || self.backfill_max_pages == 0 {
            return Err(SyncError::Config("page limits must be positive".into()));
        }
        if self.progress_capacity == 0 {
            return Err(SyncError::Config("progress_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Sets the allowlist.
    pub fn with_monitored_members(mut self, members: EntityFilter) -> Self {
        self.monitored_members = members;
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce_ms = window.as_millis() as u64;
        self
    }

    /// Sets the poll page limit.
    pub fn with_poll_max_pages(mut self, pages: u32) -> Self {
        self.poll_max_pages = pages;
        self
    }

    /// Sets the backfill page limit.
    pub fn with_backfill_max_pages(mut self, pages: u32) -> Self {
        self.backfill_max_pages = pages;
        self
    }

    /// Sets the delay between page requests.
    pub fn with_inter_page_delay(mut self, delay: Duration) -> Self {
        self.inter_page_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Interval between scheduled ticks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Delay between page requests.
    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }

    /// Initial parameters: every allowlisted member, today, the configured poll.
    pub fn initial_parameters(&self) -> SyncParameters {
        SyncParameters::new(self.monitored_members.clone())
            .with_poll_interval(self.poll_interval())
    }

    /// Applies the allowlist to a requested filter.
    pub fn effective_filter(&self, requested: &EntityFilter) -> EntityFilter {
        if self.monitored_members.is_empty() {
            requested.clone()
        } else {
            requested.intersect(&self.monitored_members)
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::new()
    }
}
