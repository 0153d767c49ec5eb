//! Streaming transfer of one recording, wrapped in a fixed-delay retry loop.
//!
//! [`TransferExecutor`] performs a single attempt: it creates the day
//! directory, streams the asset from a [`RemoteSource`](crate::remote::RemoteSource)
//! into the destination file and reports [`TransferProgress`] after every
//! chunk. [`RetrySupervisor`] repeats whole-file attempts under a
//! [`RetryPolicy`] until one succeeds or the policy gives up.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dashcam_core::download::{
//!     RetryPolicy, RetrySupervisor, SupervisedOutcome, TransferExecutor, TransferRequest,
//! };
//! use dashcam_core::remote::DashcamClient;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(DashcamClient::new("http://192.168.0.1")?);
//! let supervisor = RetrySupervisor::new(TransferExecutor::new(client), RetryPolicy::default());
//! let request = TransferRequest {
//!     locator: "sd//norm/2025_10_12_220337_00.TS".to_string(),
//!     destination: "/tmp/dashcam/2025-10-12/2025_10_12_220337_00.TS".into(),
//! };
//! match supervisor.run(&request, &CancellationToken::new(), |_| {}).await {
//!     SupervisedOutcome::Completed(summary) => println!("{} bytes", summary.bytes_transferred),
//!     other => println!("{other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod constants;
mod error;
mod executor;
mod progress;
mod retry;
mod supervisor;

pub use constants::{ASSUMED_TYPICAL_SIZE, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
pub use error::TransferError;
pub use executor::{TransferExecutor, TransferRequest, TransferSummary, partial_path};
pub use progress::{TransferProgress, average_rate_bits_per_second, estimate_progress};
pub use retry::{RetryDecision, RetryPolicy};
pub use supervisor::{RetrySupervisor, SupervisedOutcome, SupervisorEvent};

// Note: no module-local Result aliases. Use `Result<T, TransferError>` explicitly.
