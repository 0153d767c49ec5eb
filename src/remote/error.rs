//! Error types for device listing calls.

use thiserror::Error;

/// Errors raised while talking to the device's listing endpoints.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The configured device URL (or a URL derived from it) is not valid.
    #[error("invalid device URL: {url}")]
    InvalidUrl {
        /// The rejected URL string.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// Network-level error while calling an endpoint.
    #[error("network error calling {endpoint}: {source}")]
    Network {
        /// The endpoint URL.
        endpoint: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint did not answer in time.
    #[error("timeout calling {endpoint}")]
    Timeout {
        /// The endpoint URL.
        endpoint: String,
    },

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status} calling {endpoint}")]
    HttpStatus {
        /// The endpoint URL.
        endpoint: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The endpoint answered, but not in the `var name="value";` shape expected.
    #[error("malformed response from {endpoint}: {body:?}")]
    MalformedResponse {
        /// The endpoint URL.
        endpoint: String,
        /// The raw body (truncated).
        body: String,
    },
}

/// Longest body excerpt kept in [`RemoteError::MalformedResponse`].
const MAX_BODY_EXCERPT: usize = 120;

impl RemoteError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.into(),
            }
        } else {
            Self::Network {
                endpoint: endpoint.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(endpoint: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            endpoint: endpoint.into(),
            status,
        }
    }

    /// Creates a malformed response error, keeping only a short body excerpt.
    pub fn malformed(endpoint: impl Into<String>, body: &str) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.into(),
            body: body.chars().take(MAX_BODY_EXCERPT).collect(),
        }
    }
}
