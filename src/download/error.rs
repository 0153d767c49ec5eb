//! Error types for the transfer layer.
//!
//! Every variant carries the locator or path it happened on, so a message that
//! ends up in a descriptor's `last_error` is readable on its own.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that end a single transfer attempt.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network-level error (connection refused, reset mid-body, DNS, ...).
    #[error("network error fetching {locator}: {source}")]
    Network {
        /// The asset being fetched.
        locator: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Connecting or reading the next chunk took longer than the client allows.
    #[error("timeout fetching {locator}")]
    Timeout {
        /// The asset being fetched.
        locator: String,
    },

    /// Device answered with a non-success status.
    #[error("HTTP {status} fetching {locator}")]
    HttpStatus {
        /// The asset being fetched.
        locator: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Local file system error (create directory, create file, write, flush).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failure reported by a non-HTTP byte source.
    #[error("stream error fetching {locator}: {message}")]
    Stream {
        /// The asset being fetched.
        locator: String,
        /// Collaborator-provided description.
        message: String,
    },

    /// The transfer was cancelled by the queue (clear or dispose).
    #[error("transfer of {locator} cancelled")]
    Cancelled {
        /// The asset being fetched.
        locator: String,
    },
}

impl TransferError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(locator: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                locator: locator.into(),
            }
        } else {
            Self::Network {
                locator: locator.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(locator: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            locator: locator.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a generic stream error for sources that are not HTTP backed.
    pub fn stream(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stream {
            locator: locator.into(),
            message: message.into(),
        }
    }

    /// Creates a cancellation marker.
    pub fn cancelled(locator: impl Into<String>) -> Self {
        Self::Cancelled {
            locator: locator.into(),
        }
    }

    /// Returns true when the attempt ended because the queue asked it to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// locator or path, which the source errors do not carry.
