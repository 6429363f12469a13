//! Common error types and handling for the crowd identity core

use validator::ValidationErrors;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Why an authentication attempt was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Password did not match
    BadCredential,
    /// Account is locked until its unlock token is redeemed
    Locked,
    /// Email address has not been confirmed yet
    Unconfirmed,
}

impl std::fmt::Display for AuthFailure {
    #[mutants::skip] // Message text only
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::BadCredential => write!(f, "invalid email or password"),
            AuthFailure::Locked => write!(f, "account is locked"),
            AuthFailure::Unconfirmed => write!(f, "email address is not confirmed"),
        }
    }
}

/// Why a lifecycle token was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Unknown or already consumed
    Invalid,
    /// Known but issued too long ago
    Expired,
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenRejection::Invalid => write!(f, "token is invalid"),
            TokenRejection::Expired => write!(f, "token has expired"),
        }
    }
}

/// Common error type for the crowd identity core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Authentication error: {0}")]
    Authentication(AuthFailure),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Invalid or expired token: {0}")]
    InvalidToken(TokenRejection),

    #[error("Already terminal: {0}")]
    AlreadyTerminal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the error code for rendering to callers
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Unexpected(_) => "UNEXPECTED_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Validation(_) => "VALIDATION_FAILED",
            Error::Authentication(AuthFailure::BadCredential) => "BAD_CREDENTIAL",
            Error::Authentication(AuthFailure::Locked) => "ACCOUNT_LOCKED",
            Error::Authentication(AuthFailure::Unconfirmed) => "ACCOUNT_UNCONFIRMED",
            Error::Authorization(_) => "UNAUTHORIZED",
            Error::InvalidToken(_) => "INVALID_OR_EXPIRED_TOKEN",
            Error::AlreadyTerminal(_) => "ALREADY_TERMINAL",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Storage and internal failures abort the request; everything else is
    /// recoverable and meant to be rendered back to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Unexpected(_) | Error::Database(_) | Error::Internal(_)
        )
    }

    /// Field-scoped validation errors, if this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Error::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
