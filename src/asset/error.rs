//! Error types for recording metadata parsing.

use thiserror::Error;

/// Errors raised when a remote locator cannot be turned into a [`super::VideoAsset`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// The filename does not follow the `YYYY_MM_DD_HHMMSS_NN.EXT` recording pattern.
    #[error("invalid recording filename: {filename}")]
    InvalidFilename {
        /// The offending filename (last path segment of the locator).
        filename: String,
    },

    /// The filename matched the pattern but encodes an impossible date or time.
    #[error("invalid capture timestamp in {filename}")]
    InvalidTimestamp {
        /// The offending filename.
        filename: String,
    },
}

impl AssetError {
    /// Creates an invalid filename error.
    pub fn invalid_filename(filename: impl Into<String>) -> Self {
        Self::InvalidFilename {
            filename: filename.into(),
        }
    }

    /// Creates an invalid timestamp error.
    pub fn invalid_timestamp(filename: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            filename: filename.into(),
        }
    }
}
