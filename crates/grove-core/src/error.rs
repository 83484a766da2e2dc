//! Core error types for grove-core.
//!
//! Engine guard violations, storage failures and configuration problems each
//! get their own `thiserror` enum; [`CoreError`] wraps them for callers that
//! just want to propagate with `?`.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::{Command, TimerStatus};

/// Core error type for grove-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Engine command rejected
    #[error("Timer error: {0}")]
    Engine(#[from] EngineError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by the growth timer engine.
///
/// Both variants are recoverable: the engine stays in the state it was in
/// before the rejected command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The command is not legal in the current status.
    #[error("cannot {command} while {status}")]
    InvalidTransition {
        command: Command,
        status: TimerStatus,
    },

    /// A command argument is out of range.
    #[error("invalid value for '{field}': {message}")]
    InvalidArgument { field: String, message: String },
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

    /// Connection mutex was poisoned by a panicking holder
    #[error("Database connection poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Data directory could not be created
    #[error("Failed to prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message_names_command_and_status() {
        let err = EngineError::InvalidTransition {
            command: Command::Resume,
            status: TimerStatus::Running,
        };
        assert_eq!(err.to_string(), "cannot resume while running");
    }

    #[test]
    fn engine_error_converts_into_core_error() {
        let err: CoreError = EngineError::InvalidArgument {
            field: "minutes".into(),
            message: "must be greater than 0".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Engine(_)));
    }
}
