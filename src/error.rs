//! Error types for store operations.
//!
//! Every failure carries one of four kinds so callers (the HTTP layer, the
//! CLI) can branch on [`ErrorKind`] instead of inspecting message text.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure kinds, without their message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    StorageFailure,
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// Referenced file, user, or path is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation (duplicate filepath or username).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller-supplied input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unexpected failure from the persistence layer.
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::StorageFailure(_) => ErrorKind::StorageFailure,
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            StoreError::NotFound(m)
            | StoreError::Conflict(m)
            | StoreError::InvalidInput(m)
            | StoreError::StorageFailure(m) => m,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::StorageFailure(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::StorageFailure(format!("serialization error: {}", err))
    }
}

/// Whether `err` is a SQLite UNIQUE violation on `table.column`.
pub(crate) fn is_unique_violation_on(err: &sqlx::Error, table: &str, column: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = db_err.message();
            db_err.is_unique_violation() && msg.contains(&format!("{}.{}", table, column))
        }
        _ => false,
    }
}
