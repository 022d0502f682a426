//! Core error types for safeher-core.
//!
//! Only the control surface hands these back to a caller. Background paths
//! (recognizer, dispatch worker, watchdog) log them and surface the outcome
//! through status entities and events instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::platform::Capability;

/// Core error type for safeher-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A platform capability has not been granted.
    #[error("Permission denied: {0}")]
    PermissionDenied(Capability),

    /// The contact store is empty.
    #[error("No emergency contacts saved")]
    NoContacts,

    /// Submitting the message to a recipient failed.
    #[error("Failed to send SMS to {recipient}: {reason}")]
    SendFailed { recipient: String, reason: String },

    /// The monitor could not be started.
    #[error("Failed to start service: {0}")]
    StartError(String),

    /// The persistent status entity could not be shown.
    #[error("Persistent status notification was refused by the host")]
    DisplayDenied,

    /// The accelerometer could not be subscribed.
    #[error("Accelerometer unavailable: {0}")]
    SensorUnavailable(String),

    /// Host platform errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Errors reported by host capability implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The host refused the operation for lack of a permission.
    #[error("{0} permission denied by host")]
    Denied(Capability),

    /// The facility does not exist on this host (no accelerometer, no alarm service).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The facility exists but the call failed.
    #[error("{0}")]
    Failed(String),
}

/// Result codes an SMS transport can report for a segment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmsError {
    #[error("generic failure")]
    GenericFailure,
    #[error("no service")]
    NoService,
    #[error("null PDU")]
    NullPdu,
    #[error("radio off")]
    RadioOff,
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Could not resolve the data directory
    #[error("Cannot resolve data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty value where one is required
    #[error("Empty value for '{0}'")]
    Empty(String),

    /// Value already present
    #[error("Duplicate value for '{field}': {value}")]
    Duplicate { field: String, value: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
