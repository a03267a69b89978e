//! Error taxonomy shared by every library module.
//!
//! The variants map one-to-one onto the failure classes callers can act on:
//! correct the request ([`Error::NotFound`], [`Error::InvalidArgument`]),
//! retry ([`Error::Conflict`], [`Error::Unavailable`]), or report a bug
//! ([`Error::Internal`]).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A referenced memory, context, tag, relation, or pattern does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write contention: the store lock is held elsewhere, or timed out.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request itself is malformed and must be corrected by the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store or embedding provider cannot be reached right now.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Unexpected failure inside scoring, traversal, or consolidation logic.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Stable machine-readable code for protocol responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unavailable(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Internal(format!("database error: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {e}"))
    }
}
