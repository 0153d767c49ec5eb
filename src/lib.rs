//! Dashcam Downloader Core Library
//!
//! This library pulls recordings off a WiFi dashcam: it lists what the device
//! holds, queues transfers under a concurrency cap, streams each file to a
//! per-day directory while measuring throughput, and retries dropped
//! connections a fixed number of times.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`asset`] - Recording metadata parsed from device locators
//! - [`remote`] - The device seam ([`remote::RemoteSource`]) and its HTTP client
//! - [`download`] - Single-attempt transfer executor and retry supervisor
//! - [`queue`] - Queue manager, descriptors and snapshot broadcast
//! - [`config`] - TOML file configuration for the CLI

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod asset;
pub mod config;
pub mod download;
pub mod queue;
pub mod remote;

// Re-export commonly used types
pub use asset::{AssetError, VideoAsset};
pub use download::{
    RetryPolicy, RetrySupervisor, SupervisedOutcome, TransferError, TransferExecutor,
    TransferProgress, TransferRequest,
};
pub use queue::{
    QueueConfig, QueueError, QueueManager, QueueSnapshot, QueueStatus, RuntimeProfile,
    TransferDescriptor, TransferId, TransferState,
};
pub use remote::{DashcamClient, RemoteError, RemoteSource, RemoteStream};
