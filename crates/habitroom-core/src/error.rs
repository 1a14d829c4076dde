//! Core error types for habitroom-core.
//!
//! This module defines the error hierarchy using thiserror. Each concern
//! (storage, configuration, gateway, allocation, check rounds) has its own
//! enum; [`CoreError`] wraps them for callers that don't care which layer
//! failed.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for habitroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Messaging gateway errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Group allocation errors
    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    /// Check round errors
    #[error("Check session error: {0}")]
    Session(#[from] SessionError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
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

    /// A uniqueness constraint rejected an insert
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Referenced row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A group has no free member slot left
    #[error("Group {0} has no free slot")]
    GroupFull(u64),

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
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Week key does not follow `YYYY-Www`
    #[error("Invalid week key '{0}': expected YYYY-Www")]
    InvalidWeekKey(String),

    /// Week number outside the ISO weeks of that year
    #[error("Week {week} does not exist in ISO year {year}")]
    WeekOutOfRange { year: i32, week: u32 },

    /// Unknown weekday name
    #[error("Unknown weekday '{0}'")]
    InvalidWeekday(String),

    /// Trigger time outside a day
    #[error("Invalid trigger time {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors reported by the messaging gateway.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// The platform could not be reached
    #[error("Platform unavailable: {0}")]
    Unavailable(String),

    /// The referenced member, message or container no longer exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// The platform refused the request (permissions, rate limits)
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Errors from placing a habit into a tracking group.
///
/// Every variant leaves the store without a new group; the declaration can be
/// retried as a whole.
#[derive(Error, Debug)]
pub enum AllocationError {
    /// Listing groups or counting their habits failed
    #[error("Failed to query group capacity: {0}")]
    CapacityQuery(#[source] DatabaseError),

    /// The platform container for a new group could not be created
    #[error("Failed to create group container: {0}")]
    ContainerCreation(#[source] GatewayError),

    /// The new group could not be persisted
    #[error("Failed to persist new group: {0}")]
    Persist(#[source] DatabaseError),
}

impl AllocationError {
    /// Whether retrying the declaration may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AllocationError::CapacityQuery(_) | AllocationError::Persist(_) => true,
            AllocationError::ContainerCreation(e) => !matches!(e, GatewayError::Rejected(_)),
        }
    }
}

/// Errors from the weekly check round state machine.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A round is already dispatching or awaiting responses
    #[error("A check round for {week_key} is still in progress")]
    RoundInProgress { week_key: String },

    /// The end trigger fired with no round to resolve
    #[error("No check round is active")]
    NoActiveRound,

    /// The store failed while enumerating groups
    #[error("Store failure during round: {0}")]
    Store(#[from] DatabaseError),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg) => match code.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    DatabaseError::Locked
                }
                rusqlite::ErrorCode::ConstraintViolation
                    if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                {
                    DatabaseError::UniqueViolation(
                        msg.clone().unwrap_or_else(|| code.to_string()),
                    )
                }
                _ => DatabaseError::QueryFailed(err.to_string()),
            },
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
