//! HTTP client for the dashcam's CGI interface.
//!
//! The device serves its SD card over plain HTTP at `http://192.168.0.1` and
//! exposes a handful of `cgi-bin/hisnet/*.cgi` endpoints whose bodies look like
//! JavaScript assignments (`var count="69";`). Recordings themselves are plain
//! static files addressed by their locator.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use tracing::{debug, instrument};
use url::Url;

use super::error::RemoteError;
use super::{RemoteSource, RemoteStream};
use crate::download::TransferError;
use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Address the device uses on its own access point.
pub const DEFAULT_DEVICE_URL: &str = "http://192.168.0.1";

/// User-Agent the vendor app sends for video pulls; some firmware is picky.
const DEVICE_USER_AGENT: &str = "Lavf/57.83.100";

const DIR_CAPABILITY_PATH: &str = "cgi-bin/hisnet/getdircapability.cgi";
const DIR_FILE_COUNT_PATH: &str = "cgi-bin/hisnet/getdirfilecount.cgi";
const DIR_FILE_LIST_PATH: &str = "cgi-bin/hisnet/getdirfilelist.cgi";

/// HTTP client for one dashcam.
///
/// Cheap to clone; clones share the connection pool, which keeps the device's
/// small embedded server from paying a TCP handshake per request.
///
/// # Example
///
/// ```no_run
/// use dashcam_core::remote::DashcamClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = DashcamClient::new("http://192.168.0.1")?;
/// for collection in client.collections().await? {
///     let locators = client.list_collection(&collection).await?;
///     println!("{collection}: {} recordings", locators.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DashcamClient {
    client: Client,
    base_url: Url,
}

impl DashcamClient {
    /// Creates a client with default timeouts (10s connect, 60s per read).
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidUrl`] if `base_url` does not parse, and
    /// [`RemoteError::Client`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        Self::with_timeouts(base_url, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// The read timeout applies to each read of the body, not to the whole
    /// transfer, so long recordings over a slow link are not cut off.
    ///
    /// # Errors
    ///
    /// Same as [`DashcamClient::new`].
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        base_url: &str,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, RemoteError> {
        let mut parsed = Url::parse(base_url).map_err(|_| RemoteError::invalid_url(base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RemoteError::invalid_url(base_url));
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(DEVICE_USER_AGENT)
            .build()
            .map_err(|source| RemoteError::Client { source })?;

        debug!(base_url = %parsed, "created dashcam client");
        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    /// Returns the normalized device base URL (always ends with `/`).
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Lists the collections (directories) the device exposes, e.g. `norm`, `emr`.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] on transport failure, non-success status, or a
    /// body not shaped like `var capability="a,b,";`.
    #[instrument(skip(self))]
    pub async fn collections(&self) -> Result<Vec<String>, RemoteError> {
        let (endpoint, body) = self.get_text(DIR_CAPABILITY_PATH, &[]).await?;
        let value =
            quoted_value(&body).ok_or_else(|| RemoteError::malformed(endpoint.as_str(), &body))?;
        Ok(value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    /// Returns how many files `collection` holds.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] on transport failure, non-success status, or a
    /// body not shaped like `var count="69";`.
    #[instrument(skip(self))]
    pub async fn file_count(&self, collection: &str) -> Result<usize, RemoteError> {
        let (endpoint, body) = self
            .get_text(DIR_FILE_COUNT_PATH, &[("-dir", collection.to_string())])
            .await?;
        quoted_value(&body)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .ok_or_else(|| RemoteError::malformed(endpoint.as_str(), &body))
    }

    /// Lists every locator in `collection`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`file_count`](Self::file_count) and
    /// [`RemoteSource::list_assets`].
    #[instrument(skip(self))]
    pub async fn list_collection(&self, collection: &str) -> Result<Vec<String>, RemoteError> {
        let count = self.file_count(collection).await?;
        if count == 0 {
            debug!(collection, "collection is empty");
            return Ok(Vec::new());
        }
        self.list_assets(collection, 0, count - 1).await
    }

    /// Resolves a locator to the URL it is served from.
    fn asset_url(&self, locator: &str) -> Option<Url> {
        self.base_url.join(locator.trim_start_matches('/')).ok()
    }

    fn endpoint_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, RemoteError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|_| RemoteError::invalid_url(format!("{}{path}", self.base_url)))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_text(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(String, String), RemoteError> {
        let url = self.endpoint_url(path, query)?;
        let endpoint = url.to_string();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RemoteError::network(endpoint.as_str(), e))?;

        if !response.status().is_success() {
            return Err(RemoteError::http_status(
                endpoint,
                response.status().as_u16(),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::network(endpoint.as_str(), e))?;
        debug!(endpoint = %endpoint, body_len = body.len(), "device responded");
        Ok((endpoint, body))
    }
}

#[async_trait]
impl RemoteSource for DashcamClient {
    #[instrument(skip(self))]
    async fn list_assets(
        &self,
        collection: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, RemoteError> {
        let (_, body) = self
            .get_text(
                DIR_FILE_LIST_PATH,
                &[
                    ("-dir", collection.to_string()),
                    ("-start", start.to_string()),
                    ("-end", end.to_string()),
                ],
            )
            .await?;
        Ok(parse_file_list(&body))
    }

    #[instrument(skip(self))]
    async fn open_stream(&self, locator: &str) -> Result<RemoteStream, TransferError> {
        let url = self
            .asset_url(locator)
            .ok_or_else(|| TransferError::stream(locator, "locator does not form a valid URL"))?;

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "*/*")
            .send()
            .await
            .map_err(|e| TransferError::network(locator, e))?;

        into_remote_stream(locator, response)
    }
}

fn into_remote_stream(locator: &str, response: Response) -> Result<RemoteStream, TransferError> {
    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::http_status(locator, status.as_u16()));
    }

    let total_bytes = response.content_length();
    let owned_locator = locator.to_string();
    let body = response
        .bytes_stream()
        .map(move |chunk| chunk.map_err(|e| TransferError::network(owned_locator.as_str(), e)))
        .boxed();

    debug!(locator, ?total_bytes, "opened asset stream");
    Ok(RemoteStream { body, total_bytes })
}

/// Extracts the first double-quoted value from a `var name="value";` body.
fn quoted_value(body: &str) -> Option<&str> {
    let mut parts = body.split('"');
    parts.next()?;
    let value = parts.next()?;
    // A closing quote must exist, otherwise the body was truncated.
    parts.next().map(|_| value)
}

/// Splits a `;`-separated file list, dropping blanks.
fn parse_file_list(body: &str) -> Vec<String> {
    body.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}
