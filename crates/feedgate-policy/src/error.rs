//! Policy error taxonomy.

use thiserror::Error;

use feedgate_authn::AuthnError;
use feedgate_domain::EngineError;

/// Domain database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database connection error: {message}")]
    Connection { message: String },

    #[error("database query error: {message}")]
    Query { message: String },
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::Connection {
                    message: err.to_string(),
                }
            }
            other => DbError::Query {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for domain database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors a policy operation can surface.
///
/// `Unauthorized` carries no detail: it covers missing credentials, denied
/// actions, and actions on objects whose existence is not disclosable.
/// `NotFound` is only produced for callers who would otherwise be
/// authorized.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// A tuple write or delete the schema forbids; a client fault.
    #[error("schema violation: {message}")]
    SchemaViolation { message: String },

    /// Engine, database, or identity endpoint failure.
    #[error("upstream failure: {message}")]
    Upstream { message: String },

    /// Deadline elapsed or the client disconnected.
    #[error("cancelled")]
    Cancelled,
}

impl From<EngineError> for PolicyError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Store(inner) => PolicyError::Upstream {
                message: inner.to_string(),
            },
            client_fault => PolicyError::SchemaViolation {
                message: client_fault.to_string(),
            },
        }
    }
}

impl From<AuthnError> for PolicyError {
    fn from(err: AuthnError) -> Self {
        PolicyError::Upstream {
            message: err.to_string(),
        }
    }
}

impl From<DbError> for PolicyError {
    fn from(err: DbError) -> Self {
        PolicyError::Upstream {
            message: err.to_string(),
        }
    }
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
