//! In-memory [`RemoteSource`] with scripted per-locator behavior.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use dashcam_core::download::TransferError;
use dashcam_core::remote::{RemoteError, RemoteSource, RemoteStream};
use futures_util::{StreamExt, stream};
use tokio::sync::Semaphore;

/// How one fake recording behaves when opened.
#[derive(Clone)]
pub struct FakeAsset {
    chunks: Vec<Bytes>,
    total_bytes: Option<u64>,
    failing_opens: u32,
    gate: Option<Arc<Semaphore>>,
}

impl FakeAsset {
    /// `count` chunks of `len` bytes with the total reported.
    pub fn sized(count: usize, len: usize) -> Self {
        let chunk = Bytes::from(vec![0xAB; len]);
        Self {
            chunks: vec![chunk; count],
            total_bytes: Some((count * len) as u64),
            failing_opens: 0,
            gate: None,
        }
    }

    /// Body of unknown length.
    pub fn without_length(mut self) -> Self {
        self.total_bytes = None;
        self
    }

    /// First `n` opens fail with a simulated connection reset.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.failing_opens = n;
        self
    }

    /// Every open fails.
    pub fn always_failing() -> Self {
        Self::sized(1, 1).failing_first(u32::MAX)
    }

    /// The body yields nothing until a permit is added to the returned gate.
    /// One permit releases one opened stream.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }
}

#[derive(Default)]
pub struct FakeRemote {
    assets: Mutex<Vec<(String, FakeAsset)>>,
    opens: Mutex<HashMap<String, u32>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, locator: &str, asset: FakeAsset) {
        self.assets
            .lock()
            .unwrap()
            .push((locator.to_string(), asset));
    }

    /// How many times `locator` was opened.
    pub fn opens(&self, locator: &str) -> u32 {
        self.opens
            .lock()
            .unwrap()
            .get(locator)
            .copied()
            .unwrap_or(0)
    }

    fn lookup(&self, locator: &str) -> Option<FakeAsset> {
        self.assets
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == locator)
            .map(|(_, asset)| asset.clone())
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn list_assets(
        &self,
        collection: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, RemoteError> {
        let needle = format!("/{collection}/");
        Ok(self
            .assets
            .lock()
            .unwrap()
            .iter()
            .map(|(locator, _)| locator.clone())
            .filter(|locator| locator.contains(&needle))
            .skip(start)
            .take(end.saturating_sub(start) + 1)
            .collect())
    }

    async fn open_stream(&self, locator: &str) -> Result<RemoteStream, TransferError> {
        let attempt = {
            let mut opens = self.opens.lock().unwrap();
            let count = opens.entry(locator.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let Some(asset) = self.lookup(locator) else {
            return Err(TransferError::http_status(locator, 404));
        };
        if attempt <= asset.failing_opens {
            return Err(TransferError::stream(locator, "simulated connection reset"));
        }

        let FakeAsset {
            chunks,
            total_bytes,
            gate,
            ..
        } = asset;
        let body = stream::unfold((0usize, chunks, gate), |(index, chunks, gate)| async move {
            if index == 0
                && let Some(gate) = &gate
            {
                gate.acquire().await.ok()?.forget();
            }
            let chunk = chunks.get(index)?.clone();
            Some((Ok(chunk), (index + 1, chunks, gate)))
        })
        .boxed();

        Ok(RemoteStream { body, total_bytes })
    }
}
