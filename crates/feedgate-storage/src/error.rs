//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
///
/// `DuplicateTuple` and `TupleNotFound` are contract errors the engine maps
/// to its own taxonomy; the rest are I/O failures that propagate opaquely.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Point write of a tuple that already exists.
    #[error("duplicate tuple: {tuple}")]
    DuplicateTuple { tuple: String },

    /// Point delete of a tuple that does not exist.
    #[error("tuple not found: {tuple}")]
    TupleNotFound { tuple: String },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Transaction error.
    #[error("transaction error: {message}")]
    TransactionError { message: String },
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::ConnectionError {
                    message: err.to_string(),
                }
            }
            other => StorageError::QueryError {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
