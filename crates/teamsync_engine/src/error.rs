//! Error types for the sync engine.

use crate::reconcile::ReconcileError;
use teamsync_model::ModelError;
use teamsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote service is known to be unreachable.
    #[error("not connected to remote service")]
    NotConnected,

    /// A remote payload could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Remote data was malformed.
    #[error("reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// The local store rejected a read or write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A model value could not be built or serialized.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// The session was superseded or explicitly aborted.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid settings.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later attempt may succeed unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            _ => false,
        }
    }

    /// Returns true for connectivity failures, which are reported as a soft
    /// error state and retried by the next tick or reconnect.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. } | SyncError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::Protocol("bad json".into()).is_retryable());
    }

    #[test]
    fn transient_errors() {
        assert!(SyncError::transport_fatal("refused").is_transient());
        assert!(SyncError::NotConnected.is_transient());
        assert!(!SyncError::Config("zero interval".into()).is_transient());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConnected;
        assert_eq!(err.to_string(), "not connected to remote service");

        let err = SyncError::from(ReconcileError::EmptyId { kind: "member" });
        assert!(err.to_string().contains("member"));
    }
}
