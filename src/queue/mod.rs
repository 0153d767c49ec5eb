//! In-memory transfer queue with a concurrency cap.
//!
//! The queue system consists of:
//! - [`QueueManager`] - admission control and lifecycle bookkeeping
//! - [`TransferDescriptor`] - one queued, running or finished transfer
//! - [`TransferState`] - descriptor lifecycle states
//! - [`QueueSnapshot`] - what subscribers receive after every change
//! - [`QueueError`] - operation error types
//!
//! Descriptors move `Queued -> Active -> {Completed | Failed}`. At most
//! `concurrency_cap` are `Active` at once; free slots go to the oldest
//! `Queued` descriptors first.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dashcam_core::queue::{QueueConfig, QueueManager};
//! use dashcam_core::remote::DashcamClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(DashcamClient::new("http://192.168.0.1")?);
//! let queue = QueueManager::new(client.clone(), QueueConfig::new("/home/me/Videos/dashcam"))?;
//!
//! for locator in client.list_collection("norm").await? {
//!     queue.enqueue_locator(&locator)?;
//! }
//! queue.start();
//! queue.wait_idle().await;
//! println!("{:?}", queue.status());
//! queue.dispose();
//! # Ok(())
//! # }
//! ```

mod descriptor;
mod error;
mod manager;

pub use descriptor::{TransferDescriptor, TransferId, TransferState};
pub use error::QueueError;
pub use manager::QueueManager;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::download::RetryPolicy;

/// Minimum allowed concurrency cap.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency cap. The device's embedded server degrades
/// well before this.
pub const MAX_CONCURRENCY: usize = 16;

/// Default cap on a desktop host.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default cap on a phone or other constrained host.
pub const MOBILE_CONCURRENCY: usize = 2;

/// Host class the queue runs on; picks the default concurrency cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeProfile {
    #[default]
    Desktop,
    Mobile,
}

impl RuntimeProfile {
    /// Default concurrency cap for this profile.
    #[must_use]
    pub fn default_concurrency(self) -> usize {
        match self {
            Self::Desktop => DEFAULT_CONCURRENCY,
            Self::Mobile => MOBILE_CONCURRENCY,
        }
    }
}

/// Settings for one [`QueueManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Absolute directory under which `<YYYY-MM-DD>/<filename>` destinations are built.
    pub download_root: PathBuf,
    /// Maximum simultaneous transfers.
    pub concurrency_cap: usize,
    /// Attempts and delay for each transfer.
    pub retry_policy: RetryPolicy,
}

impl QueueConfig {
    /// Desktop defaults rooted at `download_root`.
    pub fn new(download_root: impl Into<PathBuf>) -> Self {
        Self::for_profile(download_root, RuntimeProfile::Desktop)
    }

    /// Defaults for `profile` rooted at `download_root`.
    pub fn for_profile(download_root: impl Into<PathBuf>, profile: RuntimeProfile) -> Self {
        Self {
            download_root: download_root.into(),
            concurrency_cap: profile.default_concurrency(),
            retry_policy: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_concurrency_cap(mut self, cap: usize) -> Self {
        self.concurrency_cap = cap;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// Point-in-time counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub total: usize,
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStatus {
    /// Tallies `items` by state.
    #[must_use]
    pub fn tally<'a>(items: impl IntoIterator<Item = &'a TransferDescriptor>) -> Self {
        items
            .into_iter()
            .fold(Self::default(), |mut status, item| {
                status.total += 1;
                match item.state() {
                    TransferState::Queued => status.queued += 1,
                    TransferState::Active => status.active += 1,
                    TransferState::Completed => status.completed += 1,
                    TransferState::Failed => status.failed += 1,
                }
                status
            })
    }
}

/// The whole collection as of one change.
///
/// `version` increases by one per published change, so a subscriber can tell
/// whether it missed any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub version: u64,
    pub running: bool,
    pub items: Vec<TransferDescriptor>,
}

impl QueueSnapshot {
    /// Counts by state.
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        QueueStatus::tally(&self.items)
    }

    /// Looks up one descriptor.
    #[must_use]
    pub fn get(&self, id: TransferId) -> Option<&TransferDescriptor> {
        self.items.iter().find(|item| item.id() == id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_default_caps() {
        assert_eq!(RuntimeProfile::Desktop.default_concurrency(), 3);
        assert_eq!(RuntimeProfile::Mobile.default_concurrency(), 2);
        assert_eq!(RuntimeProfile::default(), RuntimeProfile::Desktop);
    }

    #[test]
    fn test_queue_config_builders() {
        let config = QueueConfig::for_profile("/videos", RuntimeProfile::Mobile)
            .with_concurrency_cap(5)
            .with_retry_policy(RetryPolicy::with_max_attempts(7));
        assert_eq!(config.download_root, PathBuf::from("/videos"));
        assert_eq!(config.concurrency_cap, 5);
        assert_eq!(config.retry_policy.max_attempts(), 7);
    }

    #[test]
    fn test_queue_status_tally_counts_each_state() {
        let asset =
            crate::asset::VideoAsset::from_locator("sd//norm/2025_10_12_220337_00.TS").unwrap();
        let queued =
            TransferDescriptor::queued(TransferId::new(1), asset.clone(), PathBuf::from("/a"));
        let mut failed =
            TransferDescriptor::queued(TransferId::new(2), asset, PathBuf::from("/b"));
        failed.activate();
        failed.fail("boom");

        let status = QueueStatus::tally([&queued, &failed]);
        assert_eq!(
            status,
            QueueStatus {
                total: 2,
                queued: 1,
                failed: 1,
                ..QueueStatus::default()
            }
        );
    }
}
