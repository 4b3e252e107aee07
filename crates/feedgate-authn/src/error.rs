//! Authentication error types.

use thiserror::Error;

/// Errors from token validation and identity resolution.
#[derive(Debug, Error)]
pub enum AuthnError {
    /// Bearer token failed validation.
    #[error("invalid token: {message}")]
    InvalidToken { message: String },

    /// Identity endpoint returned an error or was unreachable.
    #[error("identity endpoint error: {message}")]
    Endpoint { message: String },

    /// Identity lookup exceeded its deadline.
    #[error("identity lookup timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Result type for authentication operations.
pub type AuthnResult<T> = Result<T, AuthnError>;
