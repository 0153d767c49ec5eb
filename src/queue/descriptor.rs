//! Transfer descriptors and their lifecycle states.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::asset::VideoAsset;
use crate::download::{TransferProgress, TransferSummary};

/// Identifier of a descriptor, unique within one [`QueueManager`](super::QueueManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TransferId(u64);

impl TransferId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a transfer.
///
/// `Queued -> Active -> {Completed | Failed}` are the only moves. A descriptor
/// whose file already exists is born `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Waiting for a free slot.
    Queued,
    /// Handed to a worker; retries happen inside this state.
    Active,
    /// File written in full.
    Completed,
    /// Every attempt failed.
    Failed,
}

impl TransferState {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `Completed` and `Failed` never change again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal move.
    #[must_use]
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Active) | (Self::Active, Self::Completed | Self::Failed)
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransferState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid transfer state: {s}")),
        }
    }
}

/// One queued, running or finished transfer.
///
/// Descriptors handed out by the queue are copies; the queue owns the live
/// record and mutates it only through validated transitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferDescriptor {
    id: TransferId,
    asset: VideoAsset,
    destination: PathBuf,
    state: TransferState,
    bytes_transferred: u64,
    total_bytes: Option<u64>,
    rate_bits_per_second: f64,
    progress: f64,
    attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

impl TransferDescriptor {
    pub(crate) fn queued(id: TransferId, asset: VideoAsset, destination: PathBuf) -> Self {
        Self {
            id,
            asset,
            destination,
            state: TransferState::Queued,
            bytes_transferred: 0,
            total_bytes: None,
            rate_bits_per_second: 0.0,
            progress: 0.0,
            attempt: 0,
            last_error: None,
        }
    }

    /// A descriptor for a file that is already on disk.
    pub(crate) fn already_present(
        id: TransferId,
        asset: VideoAsset,
        destination: PathBuf,
        size: u64,
    ) -> Self {
        Self {
            state: TransferState::Completed,
            bytes_transferred: size,
            total_bytes: Some(size),
            progress: 1.0,
            ..Self::queued(id, asset, destination)
        }
    }

    #[must_use]
    pub fn id(&self) -> TransferId {
        self.id
    }

    #[must_use]
    pub fn asset(&self) -> &VideoAsset {
        &self.asset
    }

    /// Locator the bytes are read from.
    #[must_use]
    pub fn remote_locator(&self) -> &str {
        &self.asset.locator
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[must_use]
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Bytes written by the current (or final) attempt.
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    #[must_use]
    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    /// Cumulative average rate of the current attempt.
    #[must_use]
    pub fn rate_bits_per_second(&self) -> f64 {
        self.rate_bits_per_second
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Current attempt number; 0 until the first attempt starts.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Failure summary, present only in [`TransferState::Failed`].
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn transition(&mut self, next: TransferState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            warn!(
                id = %self.id,
                from = %self.state,
                to = %next,
                "rejected illegal state transition"
            );
            false
        }
    }

    pub(crate) fn activate(&mut self) -> bool {
        self.transition(TransferState::Active)
    }

    /// Resets per-attempt counters; every attempt starts from byte zero.
    pub(crate) fn begin_attempt(&mut self, attempt: u32) {
        if self.state == TransferState::Active {
            self.attempt = attempt;
            self.bytes_transferred = 0;
            self.total_bytes = None;
            self.rate_bits_per_second = 0.0;
            self.progress = 0.0;
        }
    }

    pub(crate) fn record_progress(&mut self, progress: &TransferProgress) {
        if self.state == TransferState::Active {
            self.bytes_transferred = progress.bytes_transferred;
            self.total_bytes = progress.total_bytes;
            self.rate_bits_per_second = progress.rate_bits_per_second;
            self.progress = progress.progress;
        }
    }

    pub(crate) fn complete(&mut self, summary: &TransferSummary) -> bool {
        if !self.transition(TransferState::Completed) {
            return false;
        }
        self.bytes_transferred = summary.total_bytes;
        self.total_bytes = Some(summary.total_bytes);
        self.rate_bits_per_second = summary.rate_bits_per_second;
        self.progress = 1.0;
        true
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.transition(TransferState::Failed) {
            return false;
        }
        self.last_error = Some(message.into());
        true
    }
}
