//! Recording metadata derived from dashcam locators.
//!
//! The device names every recording `YYYY_MM_DD_HHMMSS_NN.EXT` and files it
//! under a collection directory (`norm`, `back_emr`, `photo`, ...). Capture
//! time and classification are recovered from that locator alone.
//!
//! # Example
//!
//! ```
//! use dashcam_core::asset::{AssetKind, Camera, VideoAsset};
//! use std::path::Path;
//!
//! let asset = VideoAsset::from_locator("sd//back_emr/2025_10_12_220337_00.TS").unwrap();
//! assert_eq!(asset.camera, Camera::Back);
//! assert_eq!(asset.kind, AssetKind::Emergency);
//! assert_eq!(
//!     asset.destination(Path::new("/videos")),
//!     Path::new("/videos/2025-10-12/2025_10_12_220337_00.TS")
//! );
//! ```

mod error;

pub use error::AssetError;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;

/// Recording filename pattern: date, six-digit time, sequence, extension.
#[allow(clippy::expect_used)]
static RECORDING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})_(\d{2})_(\d{2})_(\d{2})(\d{2})(\d{2})_\d{2}\.(TS|THM|TXT)$")
        .expect("recording regex is valid") // Static pattern, safe to panic
});

/// Which lens produced the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Camera {
    Front,
    Back,
}

impl Camera {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the device recorded the asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Continuous loop recording.
    Normal,
    /// Locked by the G-sensor or the emergency button.
    Emergency,
    /// Still capture.
    Photo,
}

impl AssetKind {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Emergency => "emergency",
            Self::Photo => "photo",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recording on the device, identified by its opaque locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoAsset {
    /// Opaque device path, passed back verbatim when streaming.
    pub locator: String,
    /// Original filename (last locator segment).
    pub filename: String,
    /// Capture time encoded in the filename (device local time).
    pub captured_at: NaiveDateTime,
    /// Front or back lens.
    pub camera: Camera,
    /// Recording classification.
    pub kind: AssetKind,
}

impl VideoAsset {
    /// Parses asset metadata from a device locator such as
    /// `sd//norm/2025_10_12_220337_00.TS`.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::InvalidFilename`] when the last segment does not follow
    /// the recording naming scheme, and [`AssetError::InvalidTimestamp`] when it
    /// encodes an impossible date or time.
    pub fn from_locator(locator: &str) -> Result<Self, AssetError> {
        let filename = locator.rsplit('/').next().unwrap_or(locator).trim();
        let caps = RECORDING_PATTERN
            .captures(filename)
            .ok_or_else(|| AssetError::invalid_filename(filename))?;

        let field = |index: usize| caps[index].parse::<u32>().unwrap_or(u32::MAX);
        let year = i32::try_from(field(1)).map_err(|_| AssetError::invalid_timestamp(filename))?;
        let captured_at = NaiveDate::from_ymd_opt(year, field(2), field(3))
            .and_then(|date| date.and_hms_opt(field(4), field(5), field(6)))
            .ok_or_else(|| AssetError::invalid_timestamp(filename))?;

        let camera = if locator.contains("/back_") {
            Camera::Back
        } else {
            Camera::Front
        };

        let kind = if locator.contains("/emr/") || locator.contains("/back_emr/") {
            AssetKind::Emergency
        } else if locator.contains("/photo/") || locator.contains("/back_photo/") {
            AssetKind::Photo
        } else {
            AssetKind::Normal
        };

        Ok(Self {
            locator: locator.to_string(),
            filename: filename.to_string(),
            captured_at,
            camera,
            kind,
        })
    }

    /// Capture date formatted as the day partition directory (`YYYY-MM-DD`).
    #[must_use]
    pub fn day_partition(&self) -> String {
        self.captured_at.format("%Y-%m-%d").to_string()
    }

    /// Local path for this asset: `<root>/<YYYY-MM-DD>/<filename>`.
    ///
    /// The date is the capture date, never the wall-clock time of the call.
    #[must_use]
    pub fn destination(&self, root: &Path) -> PathBuf {
        root.join(self.day_partition()).join(&self.filename)
    }
}

impl fmt::Display for VideoAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.filename, self.camera, self.kind)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_locator_front_normal() {
        let asset = VideoAsset::from_locator("sd//norm/2025_10_12_220337_00.TS").unwrap();
        assert_eq!(asset.filename, "2025_10_12_220337_00.TS");
        assert_eq!(
            asset.captured_at,
            NaiveDate::from_ymd_opt(2025, 10, 12)
                .unwrap()
                .and_hms_opt(22, 3, 37)
                .unwrap()
        );
        assert_eq!(asset.camera, Camera::Front);
        assert_eq!(asset.kind, AssetKind::Normal);
    }

    #[test]
    fn test_from_locator_back_camera() {
        let asset = VideoAsset::from_locator("sd//back_norm/2025_10_12_220337_00.TS").unwrap();
        assert_eq!(asset.camera, Camera::Back);
        assert_eq!(asset.kind, AssetKind::Normal);
    }

    #[test]
    fn test_from_locator_emergency_and_photo() {
        let asset = VideoAsset::from_locator("sd//emr/2025_10_12_220337_00.TS").unwrap();
        assert_eq!(asset.kind, AssetKind::Emergency);

        let asset = VideoAsset::from_locator("sd//back_photo/2025_10_12_220337_00.THM").unwrap();
        assert_eq!(asset.kind, AssetKind::Photo);
        assert_eq!(asset.camera, Camera::Back);
    }

    #[test]
    fn test_from_locator_rejects_unknown_filename() {
        let result = VideoAsset::from_locator("invalid_filename.TS");
        assert!(matches!(result, Err(AssetError::InvalidFilename { .. })));

        let result = VideoAsset::from_locator("sd//norm/2025_10_12_220337_00.MP4");
        assert!(matches!(result, Err(AssetError::InvalidFilename { .. })));
    }

    #[test]
    fn test_from_locator_rejects_impossible_timestamp() {
        let result = VideoAsset::from_locator("sd//norm/2025_02_30_220337_00.TS");
        assert!(matches!(result, Err(AssetError::InvalidTimestamp { .. })));

        let result = VideoAsset::from_locator("sd//norm/2025_10_12_256100_00.TS");
        assert!(matches!(result, Err(AssetError::InvalidTimestamp { .. })));
    }

    #[test]
    fn test_destination_partitions_by_capture_day() {
        let asset = VideoAsset::from_locator("sd//norm/2024_01_31_235959_03.TS").unwrap();
        assert_eq!(asset.day_partition(), "2024-01-31");
        assert_eq!(
            asset.destination(Path::new("/data/dashcam")),
            PathBuf::from("/data/dashcam/2024-01-31/2024_01_31_235959_03.TS")
        );
    }
}
