//! Unified error types for freshwatch.
//!
//! Variants follow the failure taxonomy of the detection flow: transport,
//! payload, cache invalidation, reload and storage. [`ErrorCategory`] turns
//! any of them into the short message shown to the user.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite;

/// Unified error type for the freshness detector and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an empty endpoint URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The metadata request could not be sent or its body could not be read.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// The transport gave up waiting for the metadata endpoint.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// The metadata endpoint answered with a non-2xx status.
    #[error("HTTP_ERROR: status {status}")]
    HttpStatus { status: u16 },

    /// The metadata body is not a `{version, lastUpdated}` document.
    #[error("MALFORMED_RESPONSE: {0}")]
    MalformedResponse(String),

    /// Clearing client-held caches failed. Never fatal to a refresh.
    #[error("CACHE_INVALIDATION_FAILED: {0}")]
    CacheInvalidation(String),

    /// Issuing the reload failed.
    #[error("RELOAD_FAILED: {0}")]
    Reload(String),

    /// Persistent key-value store read or write failed.
    #[error("STORAGE_ERROR: {0}")]
    Storage(String),

    /// SQLite operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORAGE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

/// Coarse classification used to build user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    NotFound,
    ServerError,
    Unknown,
}

impl ErrorCategory {
    /// Human-readable message for a refresh-error panel or toast.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorCategory::Network => "Network connection failed, please check your connection",
            ErrorCategory::Timeout => "The request timed out, please try again later",
            ErrorCategory::NotFound => "Content not found, please check the site address",
            ErrorCategory::ServerError => "Server error, please try again later",
            ErrorCategory::Unknown => "Refresh failed, please reload the page manually",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::NotFound => "not-found",
            ErrorCategory::ServerError => "server-error",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error for user-facing reporting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network(_) => ErrorCategory::Network,
            Error::FetchTimeout(_) => ErrorCategory::Timeout,
            Error::HttpStatus { status: 404 } => ErrorCategory::NotFound,
            Error::HttpStatus { status } if (500..600).contains(status) => ErrorCategory::ServerError,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Shorthand for `self.category().user_message()`.
    pub fn user_message(&self) -> &'static str {
        self.category().user_message()
    }

    /// Render the `source()` chain below this error, if any.
    ///
    /// Stored as the optional stack trace of an error audit entry.
    pub fn source_chain(&self) -> Option<String> {
        let mut current = std::error::Error::source(self);
        let mut lines = Vec::new();
        while let Some(err) = current {
            lines.push(format!("caused by: {err}"));
            current = err.source();
        }
        if lines.is_empty() { None } else { Some(lines.join("\n")) }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
