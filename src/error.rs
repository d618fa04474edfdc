//! Error types for the megalink library.

use thiserror::Error;

/// Broad failure category used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input. Never worth retrying.
    Validation,
    /// Transport, status or remote-service failure.
    Network,
    /// Local filesystem failure.
    Io,
}

/// Errors that can occur while resolving or downloading links.
#[derive(Error, Debug)]
pub enum Error {
    /// The URL, key material or an API payload was not usable.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A request failed below the API level (bad status, bad body).
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The metadata API answered with a negative status code.
    #[error("API error {code}: {}", api_error_description(*code))]
    Api {
        /// Raw status code returned by the service.
        code: i64,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Config(_) => ErrorKind::Validation,
            Self::Network(_) | Self::Http(_) | Self::Api { .. } => ErrorKind::Network,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns `true` if the service asked the client to try again later.
    #[must_use]
    pub const fn is_try_again(&self) -> bool {
        matches!(self, Self::Api { code: -3 })
    }
}

/// Human-readable text for the metadata API's negative status codes.
#[must_use]
pub const fn api_error_description(code: i64) -> &'static str {
    match code {
        -1 => "internal error",
        -2 => "invalid arguments",
        -3 => "try again",
        -4 => "rate limit exceeded",
        -6 => "too many connections",
        -9 => "resource does not exist",
        -11 => "access violation",
        -16 => "resource blocked",
        -17 => "over quota",
        -18 => "temporarily unavailable",
        _ => "unknown error",
    }
}

/// A specialized `Result` type for megalink operations.
pub type Result<T> = std::result::Result<T, Error>;
