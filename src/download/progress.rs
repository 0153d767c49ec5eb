//! Progress and throughput bookkeeping for one transfer attempt.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::constants::{ASSUMED_TYPICAL_SIZE, UNKNOWN_SIZE_PROGRESS_CAP};

/// Progress of an attempt after a chunk has been written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransferProgress {
    /// Bytes written to the destination during this attempt.
    pub bytes_transferred: u64,
    /// Total length reported by the remote, if any.
    pub total_bytes: Option<u64>,
    /// Average throughput since the attempt started, in bits per second.
    pub rate_bits_per_second: f64,
    /// Fraction complete in `0.0..=1.0`.
    pub progress: f64,
}

/// Fraction complete for `bytes` out of an optional `total`.
///
/// With a known total this is the plain ratio, clamped to `1.0` in case the
/// remote sends more than it announced. Without one, the ratio is taken
/// against [`ASSUMED_TYPICAL_SIZE`] and capped at `0.95`, so an indeterminate
/// transfer never looks finished before the stream actually ends.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_progress(bytes: u64, total: Option<u64>) -> f64 {
    match total {
        Some(0) => 1.0,
        Some(total) => (bytes as f64 / total as f64).min(1.0),
        None => (bytes as f64 / ASSUMED_TYPICAL_SIZE as f64).min(UNKNOWN_SIZE_PROGRESS_CAP),
    }
}

/// Cumulative average rate: all bits so far over all time so far.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_rate_bits_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 * 8.0) / secs
    } else {
        0.0
    }
}

/// Accumulates bytes for one attempt and derives [`TransferProgress`] snapshots.
#[derive(Debug)]
pub(crate) struct ThroughputMeter {
    started: Instant,
    total_bytes: Option<u64>,
    bytes_transferred: u64,
}

impl ThroughputMeter {
    pub(crate) fn new(started: Instant, total_bytes: Option<u64>) -> Self {
        Self {
            started,
            total_bytes,
            bytes_transferred: 0,
        }
    }

    /// Records a written chunk and returns the updated progress.
    pub(crate) fn record(&mut self, chunk_len: u64) -> TransferProgress {
        self.bytes_transferred = self.bytes_transferred.saturating_add(chunk_len);
        self.snapshot(estimate_progress(self.bytes_transferred, self.total_bytes))
    }

    /// Progress once the stream is exhausted: always `1.0`.
    pub(crate) fn finish(&self) -> TransferProgress {
        self.snapshot(1.0)
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn snapshot(&self, progress: f64) -> TransferProgress {
        TransferProgress {
            bytes_transferred: self.bytes_transferred,
            total_bytes: self.total_bytes,
            rate_bits_per_second: average_rate_bits_per_second(
                self.bytes_transferred,
                self.started.elapsed(),
            ),
            progress,
        }
    }
}
