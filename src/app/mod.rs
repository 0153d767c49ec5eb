//! Command handlers and settings resolution for the binary.

pub(crate) mod progress_manager;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashcam_core::asset::VideoAsset;
use dashcam_core::config::FileConfig;
use dashcam_core::download::{DEFAULT_RETRY_DELAY, RetryPolicy};
use dashcam_core::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use dashcam_core::queue::{
    QueueConfig, QueueManager, QueueSnapshot, RuntimeProfile, TransferDescriptor, TransferId,
    TransferState,
};
use dashcam_core::remote::{DEFAULT_DEVICE_URL, DashcamClient, RemoteSource};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::{Command, FetchArgs, GlobalArgs, ListArgs};

/// How long `fetch` waits for cancelled transfers after Ctrl-C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Effective settings after merging CLI flags, config file and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) device_url: String,
    pub(crate) download_dir: PathBuf,
    pub(crate) concurrency: usize,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) connect_timeout_secs: u64,
    pub(crate) read_timeout_secs: u64,
}

/// Merges sources with precedence CLI flag > config file > built-in default.
pub(crate) fn resolve_settings(global: &GlobalArgs, file: &FileConfig) -> Result<Settings> {
    let profile = if global.mobile {
        RuntimeProfile::Mobile
    } else {
        file.profile.unwrap_or_default()
    };

    let download_dir = global
        .output_dir
        .clone()
        .or_else(|| file.download_dir.clone())
        .unwrap_or_else(default_download_dir);
    let download_dir = std::path::absolute(&download_dir)
        .with_context(|| format!("cannot resolve download dir {}", download_dir.display()))?;

    let max_attempts = global
        .max_attempts
        .or(file.max_attempts)
        .unwrap_or_else(|| RetryPolicy::default().max_attempts());
    let retry_delay = global
        .retry_delay_ms
        .or(file.retry_delay_ms)
        .map_or(DEFAULT_RETRY_DELAY, Duration::from_millis);

    Ok(Settings {
        device_url: global
            .device_url
            .clone()
            .or_else(|| file.device_url.clone())
            .unwrap_or_else(|| DEFAULT_DEVICE_URL.to_string()),
        download_dir,
        concurrency: global
            .concurrency
            .map(usize::from)
            .or(file.concurrency)
            .unwrap_or_else(|| profile.default_concurrency()),
        retry_policy: RetryPolicy::new(max_attempts, retry_delay),
        connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    })
}

/// `$HOME/Videos/Dashcam`, or `./Dashcam` without a home directory.
fn default_download_dir() -> PathBuf {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map_or_else(|| PathBuf::from("Dashcam"), |home| {
            PathBuf::from(home).join("Videos").join("Dashcam")
        })
}

pub(crate) async fn run(command: Command, settings: &Settings, quiet: bool) -> Result<ExitCode> {
    let client = DashcamClient::with_timeouts(
        &settings.device_url,
        settings.connect_timeout_secs,
        settings.read_timeout_secs,
    )?;

    match command {
        Command::Collections => {
            for collection in client.collections().await? {
                println!("{collection}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::List(args) => list(&client, &args).await,
        Command::Fetch(args) => fetch(client, settings, &args, quiet).await,
    }
}

async fn list(client: &DashcamClient, args: &ListArgs) -> Result<ExitCode> {
    let locators = match (args.start, args.end) {
        (Some(start), Some(end)) => client.list_assets(&args.collection, start, end).await?,
        _ => client.list_collection(&args.collection).await?,
    };
    for locator in locators {
        println!("{locator}");
    }
    Ok(ExitCode::SUCCESS)
}

/// One failed transfer in the summary.
#[derive(Debug, Serialize)]
struct FailedTransfer {
    locator: String,
    error: String,
}

/// Outcome of a fetch run.
#[derive(Debug, Default, Serialize)]
struct FetchSummary {
    total: usize,
    downloaded: usize,
    already_present: usize,
    failed: usize,
    pending: usize,
    bytes: u64,
    interrupted: bool,
    failures: Vec<FailedTransfer>,
}

impl FetchSummary {
    fn from_snapshot(
        snapshot: &QueueSnapshot,
        already_present: &[TransferId],
        interrupted: bool,
    ) -> Self {
        let mut summary = Self {
            total: snapshot.items.len(),
            interrupted,
            ..Self::default()
        };
        for item in &snapshot.items {
            match item.state() {
                TransferState::Completed if already_present.contains(&item.id()) => {
                    summary.already_present += 1;
                }
                TransferState::Completed => {
                    summary.downloaded += 1;
                    summary.bytes += item.bytes_transferred();
                }
                TransferState::Failed => {
                    summary.failed += 1;
                    summary.failures.push(FailedTransfer {
                        locator: item.remote_locator().to_string(),
                        error: item.last_error().unwrap_or_default().to_string(),
                    });
                }
                TransferState::Queued | TransferState::Active => summary.pending += 1,
            }
        }
        summary
    }
}

async fn fetch(
    client: DashcamClient,
    settings: &Settings,
    args: &FetchArgs,
    quiet: bool,
) -> Result<ExitCode> {
    let mut assets = Vec::new();
    for collection in &args.collections {
        let locators = client
            .list_collection(collection)
            .await
            .with_context(|| format!("listing collection `{collection}`"))?;
        let limit = args.limit.unwrap_or(usize::MAX);
        info!(collection, found = locators.len(), "listed collection");

        for locator in locators.into_iter().take(limit) {
            match VideoAsset::from_locator(&locator) {
                Ok(asset) => assets.push(asset),
                Err(e) => warn!(locator, error = %e, "skipping unrecognized file"),
            }
        }
    }

    let config = QueueConfig::new(settings.download_dir.clone())
        .with_concurrency_cap(settings.concurrency)
        .with_retry_policy(settings.retry_policy.clone());
    let queue = QueueManager::new(Arc::new(client), config)?;

    let descriptors = queue.enqueue_many(assets)?;
    let already_present: Vec<TransferId> = descriptors
        .iter()
        .filter(|descriptor| descriptor.state() == TransferState::Completed)
        .map(TransferDescriptor::id)
        .collect();
    info!(
        queued = descriptors.len() - already_present.len(),
        already_present = already_present.len(),
        concurrency_cap = queue.concurrency_cap(),
        root = %queue.config().download_root.display(),
        "starting downloads"
    );

    let use_bar = !quiet && !args.json && io::stderr().is_terminal();
    let (bar, stop_bar) =
        progress_manager::spawn_progress_ui(use_bar, queue.subscribe(), queue.status().total);

    queue.start();
    let interrupted = tokio::select! {
        () = queue.wait_idle() => false,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            warn!("interrupted, cancelling transfers");
            true
        }
    };

    let snapshot = queue.snapshot();
    queue.dispose();
    // Give cancelled workers a moment to delete their `.part` files.
    if tokio::time::timeout(DRAIN_TIMEOUT, queue.wait_idle())
        .await
        .is_err()
    {
        warn!("cancelled transfers did not wind down in time");
    }
    stop_bar.cancel();
    if let Some(handle) = bar {
        let _ = handle.await;
    }

    let summary = FetchSummary::from_snapshot(&snapshot, &already_present, interrupted);
    debug!(?summary, "fetch finished");
    print_summary(&summary, args.json)?;

    if summary.failed > 0 || interrupted {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[allow(clippy::cast_precision_loss)]
fn print_summary(summary: &FetchSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!(
        "{} downloaded ({:.1} MiB), {} already present, {} failed{}",
        summary.downloaded,
        summary.bytes as f64 / (1024.0 * 1024.0),
        summary.already_present,
        summary.failed,
        if summary.interrupted {
            format!(", {} not finished (interrupted)", summary.pending)
        } else {
            String::new()
        }
    );
    for failure in &summary.failures {
        println!("  {}: {}", failure.locator, failure.error);
    }
    Ok(())
}
