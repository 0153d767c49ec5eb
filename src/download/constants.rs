//! Constants for the transfer layer (timeouts, retry defaults, progress estimation).

use std::time::Duration;

/// Default HTTP connect timeout. The device sits on the local WiFi link.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-read timeout; a stalled body read fails after this long.
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Default attempts per transfer, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default constant pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Size assumed for a recording when the device sends no `Content-Length` (50 MiB,
/// roughly one minute of footage).
pub const ASSUMED_TYPICAL_SIZE: u64 = 50 * 1024 * 1024;

/// Upper bound for estimated progress while the total size is unknown.
pub const UNKNOWN_SIZE_PROGRESS_CAP: f64 = 0.95;
