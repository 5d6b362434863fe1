//! Error types for the reading engine and its persistence layer.
//!
//! Nothing here is fatal to a reading session: navigation errors are reported
//! back to the caller, and store errors are logged by the persistence policy
//! while in-memory progress carries on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unit {index} does not exist (document has {total} units)")]
    UnitOutOfRange { index: usize, total: usize },

    /// Units must be read in order; only units up to the first unread one are reachable.
    #[error("unit {index} is locked until unit {available} is read")]
    UnitLocked { index: usize, available: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed stored record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid timestamp '{value}' in column {column}")]
    InvalidTimestamp { column: &'static str, value: String },

    #[error("value {value} in column {column} is out of range")]
    OutOfRange { column: &'static str, value: i64 },

    /// The background writer thread is gone.
    #[error("persistence worker unavailable")]
    WorkerUnavailable,
}
