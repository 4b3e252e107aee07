//! Engine error types.

use thiserror::Error;

/// Errors produced by the tuple model and relation engine.
///
/// Validation failures keep a stable taxonomy (`invalid relation`,
/// `invalid action`, `invalid user type`, `invalid object type`) so the
/// policy layer can surface them uniformly. Schema violations are typed
/// separately from storage failures: a caller must be able to distinguish
/// "forbidden relation" from "engine offline".
#[derive(Debug, Error)]
pub enum EngineError {
    /// Relation name not in the closed vocabulary.
    #[error("invalid relation: {value}")]
    InvalidRelation { value: String },

    /// Action name not in the closed vocabulary.
    #[error("invalid action: {value}")]
    InvalidAction { value: String },

    /// Subject endpoint has an unknown or unusable type.
    #[error("invalid user type: {value}")]
    InvalidUserType { value: String },

    /// Object endpoint has an unknown or unusable type.
    #[error("invalid object type: {value}")]
    InvalidObjectType { value: String },

    /// Entity key string could not be parsed.
    #[error("invalid entity key: {value}")]
    InvalidKey { value: String },

    /// Tuple key is structurally invalid (missing endpoints, or both a
    /// relation and an action populated).
    #[error("invalid tuple: {message}")]
    InvalidTuple { message: String },

    /// Write rejected by the type-relation schema.
    #[error("schema violation: {subject} cannot hold '{relation}' on {object}")]
    SchemaViolation {
        subject: String,
        relation: String,
        object: String,
    },

    /// Point write of a tuple that is already stored.
    #[error("tuple already exists: {tuple}")]
    TupleExists { tuple: String },

    /// Point delete of a tuple that is not stored.
    #[error("tuple not found: {tuple}")]
    TupleNotFound { tuple: String },

    /// Storage backend failure; opaque to callers.
    #[error(transparent)]
    Store(#[from] feedgate_storage::StorageError),
}

impl EngineError {
    /// True for errors caused by the request rather than the engine.
    pub fn is_client_fault(&self) -> bool {
        !matches!(self, EngineError::Store(_))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
