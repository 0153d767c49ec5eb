//! Progress UI (bar) for fetch runs, driven by queue snapshots.

use std::time::Duration;

use dashcam_core::queue::{QueueSnapshot, TransferState};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// Spawns the progress bar when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_bar` is false, returns (None, stop) with stop already cancelled.
pub(crate) fn spawn_progress_ui(
    use_bar: bool,
    events: broadcast::Receiver<QueueSnapshot>,
    total: usize,
) -> (Option<tokio::task::JoinHandle<()>>, CancellationToken) {
    let stop = CancellationToken::new();
    if !use_bar {
        stop.cancel();
        return (None, stop);
    }
    let handle = spawn_bar_inner(events, total, stop.clone());
    (Some(handle), stop)
}

fn spawn_bar_inner(
    mut events: broadcast::Receiver<QueueSnapshot>,
    total: usize,
    stop: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(120));

        loop {
            let snapshot = tokio::select! {
                biased;
                () = stop.cancelled() => break,
                received = events.recv() => match received {
                    Ok(snapshot) => snapshot,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            };
            let status = snapshot.status();
            bar.set_position((status.completed + status.failed) as u64);
            bar.set_message(render_message(&snapshot));
        }

        bar.finish_and_clear();
    })
}

/// First active transfer with its progress and rate, plus how many others run.
fn render_message(snapshot: &QueueSnapshot) -> String {
    let mut active = snapshot
        .items
        .iter()
        .filter(|item| item.state() == TransferState::Active);
    let Some(first) = active.next() else {
        return String::new();
    };
    let others = active.count();

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = (first.progress() * 100.0).round() as u32;
    let mut message = format!(
        "{} {percent}% {:.1} Mbps",
        first.asset().filename,
        first.rate_bits_per_second() / 1_000_000.0
    );
    if first.attempt() > 1 {
        message.push_str(&format!(" (attempt {})", first.attempt()));
    }
    if others > 0 {
        message.push_str(&format!(" +{others} more"));
    }
    message
}
