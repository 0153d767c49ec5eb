//! The remote side of a transfer: listing recordings and streaming their bytes.
//!
//! The queue and executor only ever talk to a [`RemoteSource`]. They assume
//! nothing about the device protocol beyond "list locators of a collection"
//! and "open a byte stream for a locator". [`DashcamClient`] is the HTTP
//! implementation for the dashcam's CGI interface; tests substitute in-memory
//! sources.

mod client;
mod error;

pub use client::{DEFAULT_DEVICE_URL, DashcamClient};
pub use error::RemoteError;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::download::TransferError;

/// Body of a remote asset, yielded chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// An opened remote asset.
pub struct RemoteStream {
    /// Chunked body. Chunk sizes are decided by the underlying I/O layer.
    pub body: ByteStream,
    /// Total length when the remote reports one.
    pub total_bytes: Option<u64>,
}

impl std::fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStream")
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Capability the download core needs from the device.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Lists locators in `collection` for the inclusive index range `start..=end`.
    async fn list_assets(
        &self,
        collection: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, RemoteError>;

    /// Opens a streaming read of the asset at `locator`.
    async fn open_stream(&self, locator: &str) -> Result<RemoteStream, TransferError>;
}
