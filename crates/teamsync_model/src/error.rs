//! Error types for model construction.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised when building model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A date range whose end precedes its start.
    #[error("invalid date range: end {end_ms} precedes start {start_ms}")]
    InvalidDateRange {
        /// Range start (epoch millis).
        start_ms: u64,
        /// Range end (epoch millis).
        end_ms: u64,
    },

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}
