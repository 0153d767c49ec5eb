//! Error types for queue operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::asset::AssetError;

/// Errors that can occur while building or feeding a [`QueueManager`](super::QueueManager).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Concurrency cap outside the supported range.
    #[error(
        "invalid concurrency cap {value}: must be between {min} and {max}\n  Suggestion: Use --concurrency with a value in range"
    )]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
        /// Smallest accepted cap.
        min: usize,
        /// Largest accepted cap.
        max: usize,
    },

    /// The locator does not name a recording.
    #[error(transparent)]
    InvalidAsset(#[from] AssetError),

    /// Destinations cannot be derived from a relative download root.
    #[error(
        "download root {root} is not an absolute path\n  Suggestion: Pass an absolute --output-dir"
    )]
    UnresolvableDestination {
        /// The rejected root.
        root: PathBuf,
    },

    /// The queue was disposed and accepts no more work.
    #[error("queue has been disposed")]
    Disposed,
}

impl QueueError {
    /// Creates an `InvalidConcurrency` error for the supported range.
    #[must_use]
    pub fn invalid_concurrency(value: usize) -> Self {
        Self::InvalidConcurrency {
            value,
            min: super::MIN_CONCURRENCY,
            max: super::MAX_CONCURRENCY,
        }
    }
}
