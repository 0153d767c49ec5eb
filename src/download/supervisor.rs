//! Drives repeated [`TransferExecutor`] attempts under a [`RetryPolicy`].

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::TransferError;
use super::executor::{TransferExecutor, TransferRequest, TransferSummary};
use super::progress::TransferProgress;
use super::retry::{RetryDecision, RetryPolicy};

/// Something the supervisor reports while a transfer is running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SupervisorEvent {
    /// A new attempt is about to start; progress restarts from zero.
    AttemptStarted {
        /// 1-indexed attempt number.
        attempt: u32,
    },
    /// A chunk was written during the current attempt.
    Progress(TransferProgress),
}

/// How a supervised transfer ended.
#[derive(Debug)]
pub enum SupervisedOutcome {
    /// Some attempt streamed the whole asset.
    Completed(TransferSummary),
    /// Every attempt failed.
    Failed {
        /// Error from the last attempt.
        error: TransferError,
        /// Number of attempts made.
        attempts: u32,
    },
    /// The cancellation token fired, during an attempt or between two.
    Cancelled,
}

impl SupervisedOutcome {
    /// Human-readable summary for a failed outcome, e.g.
    /// `failed after 3 attempts: HTTP 503 fetching sd//norm/a.TS`.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Failed { error, attempts } => {
                Some(format!("failed after {attempts} attempts: {error}"))
            }
            Self::Completed(_) | Self::Cancelled => None,
        }
    }
}

/// Turns single attempts into a bounded, fixed-delay retry loop.
///
/// Each attempt restarts from byte zero and overwrites the destination; there
/// is no partial resume.
#[derive(Debug, Clone)]
pub struct RetrySupervisor {
    executor: TransferExecutor,
    policy: RetryPolicy,
}

impl RetrySupervisor {
    /// Creates a supervisor.
    #[must_use]
    pub fn new(executor: TransferExecutor, policy: RetryPolicy) -> Self {
        Self { executor, policy }
    }

    /// Runs attempts until one succeeds, the policy gives up, or `cancel` fires.
    #[instrument(skip(self, cancel, on_event), fields(locator = %request.locator))]
    pub async fn run<F>(
        &self,
        request: &TransferRequest,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> SupervisedOutcome
    where
        F: FnMut(SupervisorEvent) + Send,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "starting transfer attempt");
            on_event(SupervisorEvent::AttemptStarted { attempt });

            let result = self
                .executor
                .execute(request, cancel, |progress| {
                    on_event(SupervisorEvent::Progress(*progress));
                })
                .await;

            let error = match result {
                Ok(summary) => {
                    info!(
                        attempt,
                        bytes = summary.bytes_transferred,
                        attempt_ms = summary.elapsed.as_millis(),
                        elapsed_ms = started.elapsed().as_millis(),
                        "transfer completed"
                    );
                    return SupervisedOutcome::Completed(summary);
                }
                Err(error) if error.is_cancelled() => {
                    debug!(attempt, "transfer cancelled");
                    return SupervisedOutcome::Cancelled;
                }
                Err(error) => error,
            };

            match self.policy.should_retry(&error, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        attempt = next_attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying transfer"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!("cancelled while waiting to retry");
                            return SupervisedOutcome::Cancelled;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(attempt, %reason, error = %error, "transfer failed");
                    return SupervisedOutcome::Failed {
                        error,
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};
    use tempfile::TempDir;

    use crate::remote::{RemoteError, RemoteSource, RemoteStream};

    /// Fails the first `failures` opens, then serves `payload`.
    struct FlakyRemote {
        failures: u32,
        opens: AtomicU32,
        payload: &'static [u8],
    }

    impl FlakyRemote {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                opens: AtomicU32::new(0),
                payload: b"recording",
            }
        }
    }

    #[async_trait]
    impl RemoteSource for FlakyRemote {
        async fn list_assets(
            &self,
            _collection: &str,
            _start: usize,
            _end: usize,
        ) -> Result<Vec<String>, RemoteError> {
            Ok(Vec::new())
        }

        async fn open_stream(&self, locator: &str) -> Result<RemoteStream, TransferError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(TransferError::stream(locator, "connection reset"));
            }
            Ok(RemoteStream {
                body: stream::iter(vec![Ok(Bytes::from_static(self.payload))]).boxed(),
                total_bytes: Some(self.payload.len() as u64),
            })
        }
    }

    fn supervisor(remote: Arc<FlakyRemote>, attempts: u32, delay: Duration) -> RetrySupervisor {
        RetrySupervisor::new(
            TransferExecutor::new(remote),
            RetryPolicy::new(attempts, delay),
        )
    }

    fn request(dir: &TempDir) -> TransferRequest {
        TransferRequest {
            locator: "sd//norm/2025_10_12_220337_00.TS".to_string(),
            destination: dir.path().join("2025-10-12/2025_10_12_220337_00.TS"),
        }
    }

    #[tokio::test]
    async fn test_run_succeeds_after_transient_failures() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(FlakyRemote::new(2));
        let supervisor = supervisor(Arc::clone(&remote), 3, Duration::ZERO);

        let mut attempts_seen = Vec::new();
        let outcome = supervisor
            .run(&request(&dir), &CancellationToken::new(), |event| {
                if let SupervisorEvent::AttemptStarted { attempt } = event {
                    attempts_seen.push(attempt);
                }
            })
            .await;

        assert!(matches!(outcome, SupervisedOutcome::Completed(_)));
        assert_eq!(attempts_seen, vec![1, 2, 3]);
        assert_eq!(remote.opens.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_exhausts_attempts_with_fixed_delay() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(FlakyRemote::new(u32::MAX));
        let delay = Duration::from_millis(50);
        let supervisor = supervisor(Arc::clone(&remote), 3, delay);

        let started = Instant::now();
        let outcome = supervisor
            .run(&request(&dir), &CancellationToken::new(), |_| {})
            .await;

        assert!(started.elapsed() >= delay * 2);
        assert_eq!(remote.opens.load(Ordering::SeqCst), 3);
        let message = outcome.failure_message().unwrap();
        assert!(message.starts_with("failed after 3 attempts"), "{message}");
        assert!(message.contains("connection reset"), "{message}");
    }

    #[tokio::test]
    async fn test_run_cancelled_during_delay_stops_retrying() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(FlakyRemote::new(u32::MAX));
        let supervisor = supervisor(Arc::clone(&remote), 5, Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = supervisor.run(&request(&dir), &cancel, |_| {}).await;

        assert!(matches!(outcome, SupervisedOutcome::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(remote.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_message_only_for_failed() {
        let failed = SupervisedOutcome::Failed {
            error: TransferError::http_status("sd//norm/a.TS", 500),
            attempts: 2,
        };
        assert_eq!(
            failed.failure_message().unwrap(),
            "failed after 2 attempts: HTTP 500 fetching sd//norm/a.TS"
        );
        assert!(SupervisedOutcome::Cancelled.failure_message().is_none());
    }
}
