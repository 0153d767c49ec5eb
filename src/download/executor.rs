//! Single-attempt transfer of one remote asset to a local file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::error::TransferError;
use super::progress::{ThroughputMeter, TransferProgress};
use crate::remote::RemoteSource;

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Opaque device locator.
    pub locator: String,
    /// Absolute local path; its directory is created on demand.
    pub destination: PathBuf,
}

/// Result of a successful attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferSummary {
    /// Bytes written.
    pub bytes_transferred: u64,
    /// Total length; falls back to the bytes written when the remote sent none.
    pub total_bytes: u64,
    /// Average rate over the attempt, in bits per second.
    pub rate_bits_per_second: f64,
    /// Wall time of the attempt.
    pub elapsed: Duration,
}

/// Streams one asset from a [`RemoteSource`] into a file, reporting progress
/// after every chunk.
///
/// Bytes go to a sibling `<destination>.part` file that is truncated at the
/// start of every attempt, so a retry always starts from byte zero. Only a
/// fully flushed attempt is renamed onto the destination; a file at the
/// destination path is therefore always complete. On failure or cancellation
/// the `.part` file is removed.
#[derive(Clone)]
pub struct TransferExecutor {
    remote: Arc<dyn RemoteSource>,
}

impl std::fmt::Debug for TransferExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferExecutor").finish_non_exhaustive()
    }
}

impl TransferExecutor {
    /// Creates an executor reading from `remote`.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteSource>) -> Self {
        Self { remote }
    }

    /// Runs one attempt.
    ///
    /// `cancel` is observed while opening the stream and between chunks; a
    /// cancelled attempt returns [`TransferError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Any remote, stream, or file system failure ends the attempt with the
    /// corresponding [`TransferError`].
    #[instrument(skip(self, cancel, on_progress), fields(locator = %request.locator))]
    pub async fn execute<F>(
        &self,
        request: &TransferRequest,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<TransferSummary, TransferError>
    where
        F: FnMut(&TransferProgress) + Send,
    {
        let partial = partial_path(&request.destination);
        let result = self
            .attempt(request, &partial, cancel, &mut on_progress)
            .await;

        if result.is_err() {
            debug!(path = %partial.display(), "removing partial file after failed attempt");
            let _ = tokio::fs::remove_file(&partial).await;
        }

        result
    }

    async fn attempt<F>(
        &self,
        request: &TransferRequest,
        partial: &Path,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<TransferSummary, TransferError>
    where
        F: FnMut(&TransferProgress) + Send,
    {
        let started = Instant::now();
        let locator = request.locator.as_str();
        let destination = request.destination.as_path();

        let file = create_partial(partial).await?;

        let remote = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TransferError::cancelled(locator)),
            opened = self.remote.open_stream(locator) => opened?,
        };
        let mut body = remote.body;
        let mut meter = ThroughputMeter::new(started, remote.total_bytes);
        let mut writer = BufWriter::new(file);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransferError::cancelled(locator)),
                next = body.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| TransferError::io(partial, e))?;

            let progress = meter.record(chunk.len() as u64);
            on_progress(&progress);
        }

        writer
            .flush()
            .await
            .map_err(|e| TransferError::io(partial, e))?;
        drop(writer);

        tokio::fs::rename(partial, destination)
            .await
            .map_err(|e| TransferError::io(destination, e))?;

        let finished = meter.finish();
        let elapsed = meter.elapsed();

        #[allow(clippy::cast_precision_loss)]
        let size_mb = finished.bytes_transferred as f64 / (1024.0 * 1024.0);
        info!(
            path = %destination.display(),
            size_mb = format_args!("{size_mb:.1}"),
            mbps = format_args!("{:.1}", finished.rate_bits_per_second / 1_000_000.0),
            "transfer attempt complete"
        );

        Ok(TransferSummary {
            bytes_transferred: finished.bytes_transferred,
            total_bytes: finished.total_bytes.unwrap_or(finished.bytes_transferred),
            rate_bits_per_second: finished.rate_bits_per_second,
            elapsed,
        })
    }
}

/// Where an attempt writes before it is complete: `<destination>.part`.
#[must_use]
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Creates the day directory if absent and truncates/creates the file.
async fn create_partial(partial: &Path) -> Result<File, TransferError> {
    if let Some(parent) = partial.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TransferError::io(parent, e))?;
    }
    File::create(partial)
        .await
        .map_err(|e| TransferError::io(partial, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;
    use tempfile::TempDir;

    use crate::remote::{RemoteError, RemoteStream};

    /// Serves a fixed list of chunk results for any locator.
    struct ScriptedRemote {
        chunks: Vec<Result<&'static [u8], &'static str>>,
        total_bytes: Option<u64>,
    }

    #[async_trait]
    impl RemoteSource for ScriptedRemote {
        async fn list_assets(
            &self,
            _collection: &str,
            _start: usize,
            _end: usize,
        ) -> Result<Vec<String>, RemoteError> {
            Ok(Vec::new())
        }

        async fn open_stream(&self, locator: &str) -> Result<RemoteStream, TransferError> {
            let locator = locator.to_string();
            let items: Vec<Result<Bytes, TransferError>> = self
                .chunks
                .iter()
                .map(|chunk| match chunk {
                    Ok(data) => Ok(Bytes::from_static(data)),
                    Err(message) => Err(TransferError::stream(locator.as_str(), *message)),
                })
                .collect();
            Ok(RemoteStream {
                body: stream::iter(items).boxed(),
                total_bytes: self.total_bytes,
            })
        }
    }

    fn request(dir: &TempDir) -> TransferRequest {
        TransferRequest {
            locator: "sd//norm/2025_10_12_220337_00.TS".to_string(),
            destination: dir.path().join("2025-10-12").join("2025_10_12_220337_00.TS"),
        }
    }

    #[tokio::test]
    async fn test_execute_writes_file_and_reports_each_chunk() {
        let dir = TempDir::new().unwrap();
        let executor = TransferExecutor::new(Arc::new(ScriptedRemote {
            chunks: vec![Ok(b"abcd"), Ok(b"efgh")],
            total_bytes: Some(8),
        }));
        let request = request(&dir);

        let mut seen = Vec::new();
        let summary = executor
            .execute(&request, &CancellationToken::new(), |p| seen.push(*p))
            .await
            .unwrap();

        assert_eq!(summary.bytes_transferred, 8);
        assert_eq!(summary.total_bytes, 8);
        assert_eq!(std::fs::read(&request.destination).unwrap(), b"abcdefgh");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].bytes_transferred, 4);
        assert!((seen[0].progress - 0.5).abs() < 1e-9);
        assert!((seen[1].progress - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_execute_unknown_length_uses_bytes_written_as_total() {
        let dir = TempDir::new().unwrap();
        let executor = TransferExecutor::new(Arc::new(ScriptedRemote {
            chunks: vec![Ok(b"xyz")],
            total_bytes: None,
        }));

        let mut last = None;
        let summary = executor
            .execute(&request(&dir), &CancellationToken::new(), |p| last = Some(*p))
            .await
            .unwrap();

        assert_eq!(summary.total_bytes, 3);
        let last = last.unwrap();
        assert!(last.progress < 0.95);
        assert_eq!(last.total_bytes, None);
    }

    #[tokio::test]
    async fn test_execute_stream_error_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let executor = TransferExecutor::new(Arc::new(ScriptedRemote {
            chunks: vec![Ok(b"partial"), Err("connection reset")],
            total_bytes: Some(100),
        }));
        let request = request(&dir);

        let result = executor
            .execute(&request, &CancellationToken::new(), |_| {})
            .await;

        assert!(matches!(result, Err(TransferError::Stream { .. })));
        assert!(!request.destination.exists());
        assert!(!partial_path(&request.destination).exists());
    }

    #[tokio::test]
    async fn test_execute_keeps_bytes_out_of_destination_until_complete() {
        let dir = TempDir::new().unwrap();
        let request = request(&dir);
        let executor = TransferExecutor::new(Arc::new(ScriptedRemote {
            chunks: vec![Ok(b"abcd"), Ok(b"efgh")],
            total_bytes: Some(8),
        }));

        let mut destination_seen = Vec::new();
        let mut partial_seen = Vec::new();
        executor
            .execute(&request, &CancellationToken::new(), |_| {
                destination_seen.push(request.destination.exists());
                partial_seen.push(partial_path(&request.destination).exists());
            })
            .await
            .unwrap();

        assert_eq!(destination_seen, [false, false]);
        assert_eq!(partial_seen, [true, true]);
        assert!(!partial_path(&request.destination).exists());
        assert_eq!(std::fs::read(&request.destination).unwrap(), b"abcdefgh");
    }

    #[tokio::test]
    async fn test_execute_failure_leaves_existing_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let request = request(&dir);
        std::fs::create_dir_all(request.destination.parent().unwrap()).unwrap();
        std::fs::write(&request.destination, b"complete").unwrap();

        let executor = TransferExecutor::new(Arc::new(ScriptedRemote {
            chunks: vec![Ok(b"par"), Err("connection reset")],
            total_bytes: Some(8),
        }));
        let result = executor
            .execute(&request, &CancellationToken::new(), |_| {})
            .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read(&request.destination).unwrap(), b"complete");
        assert!(!partial_path(&request.destination).exists());
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/v/2025-10-12/2025_10_12_220337_00.TS")),
            PathBuf::from("/v/2025-10-12/2025_10_12_220337_00.TS.part")
        );
    }

    #[tokio::test]
    async fn test_execute_cancelled_token_stops_before_streaming() {
        let dir = TempDir::new().unwrap();
        let executor = TransferExecutor::new(Arc::new(ScriptedRemote {
            chunks: vec![Ok(b"data")],
            total_bytes: Some(4),
        }));
        let request = request(&dir);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut calls = 0;
        let result = executor.execute(&request, &cancel, |_| calls += 1).await;

        assert!(matches!(result, Err(TransferError::Cancelled { .. })));
        assert_eq!(calls, 0);
        assert!(!request.destination.exists());
    }

    #[tokio::test]
    async fn test_execute_overwrites_existing_file_from_scratch() {
        let dir = TempDir::new().unwrap();
        let request = request(&dir);
        std::fs::create_dir_all(request.destination.parent().unwrap()).unwrap();
        std::fs::write(&request.destination, b"stale content that is longer").unwrap();

        let executor = TransferExecutor::new(Arc::new(ScriptedRemote {
            chunks: vec![Ok(b"new")],
            total_bytes: Some(3),
        }));
        executor
            .execute(&request, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(std::fs::read(&request.destination).unwrap(), b"new");
    }
}
