//! Admission control and lifecycle bookkeeping for transfer descriptors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::descriptor::{TransferDescriptor, TransferId, TransferState};
use super::error::QueueError;
use super::{MAX_CONCURRENCY, MIN_CONCURRENCY, QueueConfig, QueueSnapshot, QueueStatus};
use crate::asset::VideoAsset;
use crate::download::{
    RetrySupervisor, SupervisedOutcome, SupervisorEvent, TransferExecutor, TransferRequest,
};
use crate::remote::RemoteSource;

/// Snapshots buffered per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 1024;

/// Owns every descriptor of one device session and runs up to
/// `concurrency_cap` transfers at a time.
///
/// Cloning yields another handle to the same queue. The lifecycle is explicit:
/// [`start`](Self::start) begins admission, [`stop`](Self::stop) pauses it
/// without touching running transfers, and [`dispose`](Self::dispose) cancels
/// everything and refuses further work.
///
/// Every change is published as a [`QueueSnapshot`] to receivers from
/// [`subscribe`](Self::subscribe) while the internal lock is held, so they see
/// changes in the order they happened. A receiver that falls more than 1024
/// snapshots behind gets `RecvError::Lagged` and should resynchronize from the
/// next snapshot.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: QueueConfig,
    supervisor: RetrySupervisor,
    state: Mutex<State>,
    /// Wakes the admission loop: new work or a freed slot.
    wake: Notify,
    /// Fires after every published change; drives `wait_idle`.
    changed: Notify,
    events: broadcast::Sender<QueueSnapshot>,
}

struct Entry {
    descriptor: TransferDescriptor,
    cancel: Option<CancellationToken>,
}

#[derive(Default)]
struct State {
    /// Submission order; admission scans front to back.
    entries: Vec<Entry>,
    /// Workers cancelled by a clear that have not exited yet. They still hold
    /// a slot, and their destination is off limits until they are gone.
    draining: HashMap<TransferId, PathBuf>,
    next_id: u64,
    version: u64,
    /// `Some` while running; cancelling it stops the admission loop.
    admission: Option<CancellationToken>,
    disposed: bool,
}

impl State {
    fn entry_mut(&mut self, id: TransferId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.descriptor.id() == id)
    }

    fn count(&self, state: TransferState) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.descriptor.state() == state)
            .count()
    }

    fn is_idle(&self) -> bool {
        let nothing_runs = self.draining.is_empty() && self.count(TransferState::Active) == 0;
        let nothing_admissible =
            self.admission.is_none() || self.count(TransferState::Queued) == 0;
        nothing_runs && nothing_admissible
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            version: self.version,
            running: self.admission.is_some(),
            items: self
                .entries
                .iter()
                .map(|entry| entry.descriptor.clone())
                .collect(),
        }
    }
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl QueueManager {
    /// Creates a stopped, empty queue reading from `remote`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConcurrency`] if the cap is outside
    /// `1..=16`, and [`QueueError::UnresolvableDestination`] if the download
    /// root is not absolute.
    pub fn new(remote: Arc<dyn RemoteSource>, config: QueueConfig) -> Result<Self, QueueError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency_cap) {
            return Err(QueueError::invalid_concurrency(config.concurrency_cap));
        }
        if !config.download_root.is_absolute() {
            return Err(QueueError::UnresolvableDestination {
                root: config.download_root,
            });
        }

        let supervisor = RetrySupervisor::new(
            TransferExecutor::new(remote),
            config.retry_policy.clone(),
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        debug!(
            concurrency_cap = config.concurrency_cap,
            root = %config.download_root.display(),
            "created queue manager"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                supervisor,
                state: Mutex::new(State::default()),
                wake: Notify::new(),
                changed: Notify::new(),
                events,
            }),
        })
    }

    /// Returns the configuration the queue was built with.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Returns the maximum number of simultaneous transfers.
    #[must_use]
    pub fn concurrency_cap(&self) -> usize {
        self.inner.config.concurrency_cap
    }

    /// Adds one recording and returns its descriptor.
    ///
    /// If a `Queued` or `Active` descriptor already targets the same
    /// destination, that descriptor is returned and nothing is added. If the
    /// destination file already exists, the new descriptor is `Completed` at
    /// once and is never transferred.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Disposed`] after [`dispose`](Self::dispose).
    #[instrument(skip(self, asset), fields(locator = %asset.locator))]
    pub fn enqueue(&self, asset: VideoAsset) -> Result<TransferDescriptor, QueueError> {
        let mut state = self.inner.lock();
        if state.disposed {
            return Err(QueueError::Disposed);
        }
        let descriptor = self.inner.insert(&mut state, asset);
        self.inner.publish(&mut state);
        drop(state);

        self.inner.wake.notify_one();
        Ok(descriptor)
    }

    /// Parses `locator` and enqueues it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidAsset`] if the locator does not name a
    /// recording, or [`QueueError::Disposed`].
    pub fn enqueue_locator(&self, locator: &str) -> Result<TransferDescriptor, QueueError> {
        let asset = VideoAsset::from_locator(locator)?;
        self.enqueue(asset)
    }

    /// Adds several recordings in order, with the same rules as
    /// [`enqueue`](Self::enqueue) applied to each. The batch is inserted
    /// under one lock and published as a single change.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Disposed`] after [`dispose`](Self::dispose); nothing
    /// is added in that case.
    #[instrument(skip(self, assets))]
    pub fn enqueue_many(
        &self,
        assets: impl IntoIterator<Item = VideoAsset>,
    ) -> Result<Vec<TransferDescriptor>, QueueError> {
        let mut state = self.inner.lock();
        if state.disposed {
            return Err(QueueError::Disposed);
        }
        let descriptors: Vec<_> = assets
            .into_iter()
            .map(|asset| self.inner.insert(&mut state, asset))
            .collect();
        debug!(count = descriptors.len(), "enqueued batch");
        self.inner.publish(&mut state);
        drop(state);

        self.inner.wake.notify_one();
        Ok(descriptors)
    }

    /// Removes a descriptor that is not `Active`. Returns false, changing
    /// nothing, if it is `Active` or unknown.
    #[instrument(skip(self))]
    pub fn remove(&self, id: TransferId) -> bool {
        let mut state = self.inner.lock();
        let Some(index) = state
            .entries
            .iter()
            .position(|entry| entry.descriptor.id() == id)
        else {
            return false;
        };
        if state.entries[index].descriptor.state() == TransferState::Active {
            debug!(%id, "refusing to remove active transfer");
            return false;
        }
        state.entries.remove(index);
        self.inner.publish(&mut state);
        true
    }

    /// Removes every `Completed` descriptor and returns how many went.
    #[instrument(skip(self))]
    pub fn clear_completed(&self) -> usize {
        let mut state = self.inner.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|entry| entry.descriptor.state() != TransferState::Completed);
        let removed = before - state.entries.len();
        if removed > 0 {
            self.inner.publish(&mut state);
        }
        removed
    }

    /// Removes every descriptor and cancels running transfers.
    ///
    /// Returns without waiting for the workers to wind down, but no event
    /// mentions a cleared descriptor afterwards. Until a cancelled worker
    /// exits it keeps its slot and its destination is not admitted again.
    #[instrument(skip(self))]
    pub fn clear_all(&self) {
        let mut state = self.inner.lock();
        let entries = std::mem::take(&mut state.entries);
        let mut cancelled = 0usize;
        for entry in entries {
            if let Some(cancel) = entry.cancel {
                cancel.cancel();
                state
                    .draining
                    .insert(entry.descriptor.id(), entry.descriptor.destination().to_path_buf());
                cancelled += 1;
            }
        }
        info!(cancelled, "cleared queue");
        self.inner.publish(&mut state);
    }

    /// Starts admitting queued work. Idempotent; does nothing once disposed.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[instrument(skip(self))]
    pub fn start(&self) {
        let mut state = self.inner.lock();
        if state.disposed || state.admission.is_some() {
            return;
        }
        let token = CancellationToken::new();
        state.admission = Some(token.clone());
        self.inner.publish(&mut state);
        drop(state);

        info!("queue started");
        tokio::spawn(Arc::clone(&self.inner).admission_loop(token));
    }

    /// Stops admitting queued work. Running transfers continue. Idempotent.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        if let Some(token) = state.admission.take() {
            token.cancel();
            self.inner.publish(&mut state);
            info!("queue stopped");
        }
    }

    /// Clears everything, stops admission and rejects further enqueues.
    #[instrument(skip(self))]
    pub fn dispose(&self) {
        self.inner.lock().disposed = true;
        self.clear_all();
        self.stop();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lock().admission.is_some()
    }

    /// Point-in-time counts by state.
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        QueueStatus::tally(self.inner.lock().entries.iter().map(|entry| &entry.descriptor))
    }

    /// Returns a copy of one descriptor.
    #[must_use]
    pub fn get(&self, id: TransferId) -> Option<TransferDescriptor> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|entry| entry.descriptor.id() == id)
            .map(|entry| entry.descriptor.clone())
    }

    /// Returns a copy of the whole collection.
    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.lock().snapshot()
    }

    /// Receives a [`QueueSnapshot`] after every subsequent change.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueSnapshot> {
        self.inner.events.subscribe()
    }

    /// Resolves once nothing is running and nothing more will be admitted:
    /// every descriptor is terminal, or the queue is stopped and only
    /// `Queued` work remains.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let idle = self.inner.lock().is_idle();
            if idle {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bumps the version and hands a snapshot to subscribers. Called with the
    /// lock held so snapshots go out in mutation order.
    fn publish(&self, state: &mut State) {
        state.version += 1;
        if self.events.receiver_count() > 0 {
            let _ = self.events.send(state.snapshot());
        }
        self.changed.notify_waiters();
    }

    fn insert(&self, state: &mut State, asset: VideoAsset) -> TransferDescriptor {
        let destination = asset.destination(&self.config.download_root);

        if let Some(existing) = state.entries.iter().find(|entry| {
            !entry.descriptor.state().is_terminal() && entry.descriptor.destination() == destination
        }) {
            debug!(id = %existing.descriptor.id(), "destination already pending");
            return existing.descriptor.clone();
        }

        state.next_id += 1;
        let id = TransferId::new(state.next_id);

        // Transfers write to a `.part` sibling, so anything at the
        // destination itself is a finished download.
        let descriptor = match existing_file_size(&destination) {
            Some(size) => {
                info!(%id, path = %destination.display(), size, "already downloaded");
                TransferDescriptor::already_present(id, asset, destination, size)
            }
            None => {
                debug!(%id, path = %destination.display(), "queued");
                TransferDescriptor::queued(id, asset, destination)
            }
        };

        state.entries.push(Entry {
            descriptor: descriptor.clone(),
            cancel: None,
        });
        descriptor
    }

    async fn admission_loop(self: Arc<Self>, stop: CancellationToken) {
        debug!("admission loop started");
        loop {
            self.admit();
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                () = self.wake.notified() => {}
            }
        }
        debug!("admission loop stopped");
    }

    /// Promotes the oldest admissible `Queued` descriptors into free slots.
    fn admit(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.admission.is_none() {
            return;
        }

        let busy = state.count(TransferState::Active) + state.draining.len();
        let mut slots = self.config.concurrency_cap.saturating_sub(busy);
        if slots == 0 {
            return;
        }

        let mut dispatched = Vec::new();
        let State {
            entries, draining, ..
        } = &mut *state;
        for entry in entries.iter_mut() {
            if slots == 0 {
                break;
            }
            let descriptor = &mut entry.descriptor;
            if descriptor.state() != TransferState::Queued
                || draining.values().any(|path| path == descriptor.destination())
                || !descriptor.activate()
            {
                continue;
            }

            let cancel = CancellationToken::new();
            entry.cancel = Some(cancel.clone());
            dispatched.push((
                descriptor.id(),
                TransferRequest {
                    locator: descriptor.remote_locator().to_string(),
                    destination: descriptor.destination().to_path_buf(),
                },
                cancel,
            ));
            slots -= 1;
        }

        if dispatched.is_empty() {
            return;
        }
        self.publish(&mut state);
        drop(state);

        for (id, request, cancel) in dispatched {
            info!(%id, locator = %request.locator, "admitted transfer");
            tokio::spawn(Arc::clone(self).run_worker(id, request, cancel));
        }
    }

    async fn run_worker(
        self: Arc<Self>,
        id: TransferId,
        request: TransferRequest,
        cancel: CancellationToken,
    ) {
        let outcome = self
            .supervisor
            .run(&request, &cancel, |event| self.apply_event(id, event))
            .await;
        self.finish(id, &outcome);
        self.wake.notify_one();
    }

    fn apply_event(&self, id: TransferId, event: SupervisorEvent) {
        let mut state = self.lock();
        // Cleared descriptors are gone; their events are dropped.
        let Some(entry) = state.entry_mut(id) else {
            return;
        };
        match event {
            SupervisorEvent::AttemptStarted { attempt } => entry.descriptor.begin_attempt(attempt),
            SupervisorEvent::Progress(progress) => entry.descriptor.record_progress(&progress),
        }
        self.publish(&mut state);
    }

    fn finish(&self, id: TransferId, outcome: &SupervisedOutcome) {
        let mut state = self.lock();
        if state.draining.remove(&id).is_some() {
            debug!(%id, "cancelled worker exited");
        } else if let Some(entry) = state.entry_mut(id) {
            entry.cancel = None;
            match outcome {
                SupervisedOutcome::Completed(summary) => {
                    entry.descriptor.complete(summary);
                }
                SupervisedOutcome::Failed { .. } => {
                    entry
                        .descriptor
                        .fail(outcome.failure_message().unwrap_or_default());
                }
                SupervisedOutcome::Cancelled => {
                    entry.descriptor.fail("transfer cancelled");
                }
            }
        }
        self.publish(&mut state);
    }
}

fn existing_file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(std::fs::Metadata::is_file)
        .map(|metadata| metadata.len())
}
