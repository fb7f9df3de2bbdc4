//! Unified error handling for the trail-tracker library.
//!
//! Filter rejections are not errors: they are reported as
//! [`FixOutcome`](crate::tracker::FixOutcome) values. Everything that can
//! actually fail (storage, validation, illegal transitions, the position
//! source) is a [`TrackerError`].

use thiserror::Error;

use crate::source::SourceError;
use crate::Lifecycle;

/// Unified error type for route tracking operations.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// No position source is available on this device
    #[error("Geolocation is not supported by this device")]
    UnsupportedSource,

    /// A session failed validation at save time
    #[error("Invalid session: {reason}")]
    InvalidSession { reason: String },

    /// An operation was attempted from a state that does not allow it
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: Lifecycle,
    },

    /// The position source refused a subscription
    #[error("Position source error: {0}")]
    Source(SourceError),

    /// Durable store failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrackerError {
    pub(crate) fn invalid_session(reason: &str) -> Self {
        TrackerError::InvalidSession {
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by a [`KeyValueStore`](crate::store::KeyValueStore) backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Writing the value would exceed the store's size limit
    #[error("Storage quota exceeded writing '{key}': {needed} bytes needed, limit {limit}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[cfg(feature = "persistence")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for trail-tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
