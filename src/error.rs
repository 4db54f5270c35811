use crate::id::ModId;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("engine is not initialized")]
    NotInitialized,

    #[error("user is not authenticated")]
    NotAuthenticated,

    #[error("authentication token expired; re-authentication required")]
    AuthExpired,

    #[error("invalid mod id")]
    InvalidModId,

    #[error("rate limited; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error {code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: u32,
        message: String,
    },

    #[error("mod {0} not found")]
    ModNotFound(ModId),

    #[error("operation illegal in current state: {0}")]
    StateConflict(String),

    #[error("archive checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("operation canceled")]
    OperationCanceled,

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], suitable for lifecycle events and
/// log lines. Copyable so events stay cheap to clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Storage,
    NotInitialized,
    NotAuthenticated,
    AuthExpired,
    InvalidModId,
    RateLimited,
    Network,
    InvalidResponse,
    Api,
    ModNotFound,
    StateConflict,
    ChecksumMismatch,
    Canceled,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Storage,
            Error::Json(_) => ErrorKind::InvalidResponse,
            Error::TomlDe(_) | Error::TomlSer(_) => ErrorKind::Other,
            Error::NotInitialized => ErrorKind::NotInitialized,
            Error::NotAuthenticated => ErrorKind::NotAuthenticated,
            Error::AuthExpired => ErrorKind::AuthExpired,
            Error::InvalidModId => ErrorKind::InvalidModId,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Network(_) => ErrorKind::Network,
            Error::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Error::Api { .. } => ErrorKind::Api,
            Error::ModNotFound(_) => ErrorKind::ModNotFound,
            Error::StateConflict(_) => ErrorKind::StateConflict,
            Error::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Error::OperationCanceled => ErrorKind::Canceled,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    /// Precondition failures are rejected before any network or disk work and
    /// clear themselves once the caller fixes the precondition.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::NotInitialized
                | Error::NotAuthenticated
                | Error::InvalidModId
                | Error::RateLimited { .. }
        )
    }

    /// Transport-class failures that a caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::InvalidResponse(_) | Error::RateLimited { .. }
        )
    }
}
