use std::time::Duration;

use onair_model::ItemId;
use thiserror::Error;

/// Failure talking to the content system or the automation engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure or 5xx; worth retrying.
    #[error("transient remote failure: {0}")]
    Transient(String),

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote resource not found: {0}")]
    NotFound(String),

    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid remote payload: {0}")]
    Decode(String),

    #[error("remote call cancelled")]
    Cancelled,
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_) | RemoteError::Timeout(_))
    }
}

/// Feed build failures. Every variant maps to `feedStatus = error` at the
/// serving boundary.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("strict mode: {} feed item(s) have unavailable media", missing_ids.len())]
    StrictViolation { missing_ids: Vec<ItemId> },

    #[error("failed to load candidate schedule: {0}")]
    Source(#[from] RemoteError),

    #[error("failed to encode feed content: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("circuit breaker open and no last-known-good feed is available")]
    CircuitOpen,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Remote(RemoteError),

    #[error("an apply for window {label} is already in flight")]
    InFlight { label: String },

    #[error("lock held for window {held} does not cover diff window {requested}")]
    WindowMismatch { held: String, requested: String },

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl From<RemoteError> for ReconcileError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Cancelled => ReconcileError::Cancelled,
            other => ReconcileError::Remote(other),
        }
    }
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
