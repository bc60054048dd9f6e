//! Error types for authorization and membership operations
//!
//! Every caller-visible failure of the Certis core is an [`AuthError`]. All
//! variants are recoverable by the caller except [`AuthError::ConfigError`]
//! raised while constructing the token service, which must stop startup.

use certis_org::StoreError;
use thiserror::Error;

/// Authorization error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Token is malformed, tampered with, or expired
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Authenticated, but the role or organization does not permit this
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness or invariant violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Lost an optimistic concurrency race; re-evaluate and retry
    #[error("Concurrent update: {0}")]
    ConcurrentUpdate(String),

    /// Unknown token, user, organization or resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation is structurally invalid in the current state
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Invitation is past its acceptance window
    #[error("Expired: {0}")]
    Expired(String),

    /// Accepting user does not match the invited email
    #[error("Mismatch: {0}")]
    Mismatch(String),

    /// Malformed input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid credentials
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authorization operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Check if this error should be logged at error level.
    ///
    /// Denials and conflicts are expected outcomes, not server faults.
    pub fn is_server_error(&self) -> bool {
        matches!(self, AuthError::Internal(_) | AuthError::ConfigError(_))
    }

    /// Whether re-evaluating preconditions and retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::ConcurrentUpdate(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidToken(_) | AuthError::InvalidCredentials => 401,
            AuthError::Forbidden(_) => 403,
            AuthError::NotFound(_) => 404,
            AuthError::Conflict(_) | AuthError::ConcurrentUpdate(_) | AuthError::Mismatch(_) => 409,
            AuthError::Expired(_) => 410,
            AuthError::PreconditionFailed(_) => 412,
            AuthError::InvalidArgument(_) => 400,
            AuthError::ConfigError(_) | AuthError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::Forbidden(_) => "FORBIDDEN",
            AuthError::Conflict(_) => "CONFLICT",
            AuthError::ConcurrentUpdate(_) => "CONCURRENT_UPDATE",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::PreconditionFailed(_) => "PRECONDITION_FAILED",
            AuthError::Expired(_) => "EXPIRED",
            AuthError::Mismatch(_) => "MISMATCH",
            AuthError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::ConfigError(_) => "CONFIG_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => AuthError::ConcurrentUpdate(err.to_string()),
            StoreError::UniqueViolation(msg) | StoreError::Invariant(msg) => AuthError::Conflict(msg),
            StoreError::NotFound { .. } => AuthError::NotFound(err.to_string()),
            StoreError::Backend(msg) => AuthError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_store_error_mapping() {
        let conflict = StoreError::VersionConflict {
            entity: "invitation",
            id: Uuid::now_v7(),
            expected: 1,
            found: 2,
        };
        let err = AuthError::from(conflict);
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 409);

        let dup = AuthError::from(StoreError::UniqueViolation("domain".to_string()));
        assert_eq!(dup, AuthError::Conflict("domain".to_string()));
        assert!(!dup.is_retryable());

        let backend = AuthError::from(StoreError::Backend("disk full".to_string()));
        assert!(backend.is_server_error());
    }

    #[test]
    fn test_unauthenticated_and_forbidden_are_distinct() {
        let unauthenticated = AuthError::InvalidToken("expired".to_string());
        let denied = AuthError::Forbidden("role".to_string());
        assert_eq!(unauthenticated.status_code(), 401);
        assert_eq!(denied.status_code(), 403);
        assert_ne!(unauthenticated.error_code(), denied.error_code());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AuthError::Expired("x".into()).error_code(), "EXPIRED");
        assert_eq!(AuthError::PreconditionFailed("x".into()).status_code(), 412);
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials");
    }
}
