//! Inputs of a sync attempt.

use crate::entity::ExternalId;
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Milliseconds in one UTC day.
pub const DAY_MS: u64 = 86_400_000;

/// The time window whose entries are synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateRange {
    /// The current UTC day, re-evaluated on every attempt.
    Today,
    /// A fixed half-open window `[start_ms, end_ms)`.
    Between {
        /// Window start (epoch millis).
        start_ms: u64,
        /// Window end (epoch millis).
        end_ms: u64,
    },
}

impl DateRange {
    /// Creates a fixed window, rejecting inverted bounds.
    pub fn between(start_ms: u64, end_ms: u64) -> ModelResult<Self> {
        if end_ms < start_ms {
            return Err(ModelError::InvalidDateRange { start_ms, end_ms });
        }
        Ok(Self::Between { start_ms, end_ms })
    }

    /// Resolves the range to concrete epoch bounds.
    ///
    /// `Today` becomes `[midnight, midnight + 24h)` of the UTC day holding `now_ms`.
    pub fn resolve(&self, now_ms: u64) -> (u64, u64) {
        match *self {
            DateRange::Today => {
                let start = now_ms - now_ms % DAY_MS;
                (start, start + DAY_MS)
            }
            DateRange::Between { start_ms, end_ms } => (start_ms, end_ms),
        }
    }
}

impl Default for DateRange {
    fn default() -> Self {
        DateRange::Today
    }
}

/// The set of monitored member ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityFilter(BTreeSet<ExternalId>);

impl EntityFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `id` is monitored.
    pub fn contains(&self, id: &ExternalId) -> bool {
        self.0.contains(id)
    }

    /// Returns true if nothing is monitored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of monitored ids.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the ids in order.
    pub fn iter(&self) -> impl Iterator<Item = &ExternalId> {
        self.0.iter()
    }

    /// Returns the ids as an ordered vector.
    pub fn to_vec(&self) -> Vec<ExternalId> {
        self.0.iter().cloned().collect()
    }

    /// Returns the ids present in both filters.
    pub fn intersect(&self, other: &EntityFilter) -> EntityFilter {
        EntityFilter(self.0.intersection(&other.0).cloned().collect())
    }
}

impl<I: Into<ExternalId>> FromIterator<I> for EntityFilter {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        EntityFilter(iter.into_iter().map(Into::into).collect())
    }
}

/// Parameters of a sync attempt.
///
/// Values are immutable; the `with_*` methods return a new value so a
/// running session never observes a parameter change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncParameters {
    /// Monitored member ids.
    pub entity_filter: EntityFilter,
    /// Entry window.
    pub date_range: DateRange,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl SyncParameters {
    /// Creates parameters for the given filter, today's range and a 30s poll.
    pub fn new(entity_filter: EntityFilter) -> Self {
        Self {
            entity_filter,
            date_range: DateRange::Today,
            poll_interval_ms: 30_000,
        }
    }

    /// Returns a copy with a different date range.
    pub fn with_date_range(&self, date_range: DateRange) -> Self {
        Self {
            date_range,
            ..self.clone()
        }
    }

    /// Returns a copy with a different filter.
    pub fn with_entity_filter(&self, entity_filter: EntityFilter) -> Self {
        Self {
            entity_filter,
            ..self.clone()
        }
    }

    /// Returns a copy with a different poll interval.
    pub fn with_poll_interval(&self, interval: Duration) -> Self {
        Self {
            poll_interval_ms: interval.as_millis() as u64,
            ..self.clone()
        }
    }

    /// The poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SyncParameters {
    fn default() -> Self {
        Self::new(EntityFilter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn today_resolves_to_utc_day() {
        let noon = 3 * DAY_MS + DAY_MS / 2;
        assert_eq!(DateRange::Today.resolve(noon), (3 * DAY_MS, 4 * DAY_MS));
        assert_eq!(DateRange::Today.resolve(3 * DAY_MS), (3 * DAY_MS, 4 * DAY_MS));
    }

    #[test]
    fn between_rejects_inverted_bounds() {
        assert!(DateRange::between(10, 5).is_err());
        let range = DateRange::between(5, 10).unwrap();
        assert_eq!(range.resolve(999), (5, 10));
    }

    #[test]
    fn with_methods_leave_original_untouched() {
        let base = SyncParameters::new(["m1", "m2"].into_iter().collect());
        let moved = base.with_date_range(DateRange::between(0, DAY_MS).unwrap());
        assert_eq!(base.date_range, DateRange::Today);
        assert_ne!(base, moved);
        assert_eq!(moved.entity_filter.len(), 2);
    }

    #[test]
    fn filter_intersection() {
        let a: EntityFilter = ["m1", "m2", "m3"].into_iter().collect();
        let b: EntityFilter = ["m2", "m3", "m4"].into_iter().collect();
        let both = a.intersect(&b);
        assert_eq!(both.to_vec(), vec![ExternalId::new("m2"), ExternalId::new("m3")]);
    }

    #[test]
    fn date_range_serde_shape() {
        let json = serde_json::to_string(&DateRange::Today).unwrap();
        assert_eq!(json, r#"{"kind":"today"}"#);
        let range: DateRange =
            serde_json::from_str(r#"{"kind":"between","start_ms":1,"end_ms":2}"#).unwrap();
        assert_eq!(range, DateRange::Between { start_ms: 1, end_ms: 2 });
    }
}
