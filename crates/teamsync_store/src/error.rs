//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted snapshot could not be decoded.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// The entity set could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store refuses writes (closed, quota exceeded, ...).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
