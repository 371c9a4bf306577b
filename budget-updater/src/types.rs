//! Update payload types
//!
//! Values reported by the update capability and forwarded to the UI side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A release offered by the update feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    /// Version string of the offered release
    pub version: String,

    /// Human-readable release notes
    pub release_notes: Option<String>,

    /// Publication timestamp
    pub release_date: DateTime<Utc>,

    /// Size of the installer, when the feed states it
    pub download_size_bytes: Option<u64>,
}

impl UpdateInfo {
    /// Create an UpdateInfo released now, without notes or size
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            release_notes: None,
            release_date: Utc::now(),
            download_size_bytes: None,
        }
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.download_size_bytes = Some(bytes);
        self
    }

    pub fn with_release_notes(mut self, notes: impl Into<String>) -> Self {
        self.release_notes = Some(notes.into());
        self
    }

    /// Download size in megabytes
    pub fn download_size_mb(&self) -> Option<f64> {
        self.download_size_bytes.map(|b| b as f64 / BYTES_PER_MB)
    }
}

/// Progress of an ongoing installer download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// Percentage complete (0-100), kept unrounded
    pub percent: f64,

    /// Bytes received so far
    pub transferred_bytes: u64,

    /// Total bytes expected
    pub total_bytes: u64,

    /// Current transfer rate
    pub bytes_per_second: f64,
}

impl DownloadProgress {
    /// Compute progress from byte counters
    pub fn new(transferred: u64, total: u64, bytes_per_second: f64) -> Self {
        let percent = if total > 0 {
            ((transferred as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        Self {
            percent,
            transferred_bytes: transferred,
            total_bytes: total,
            bytes_per_second,
        }
    }

    /// Progress of a download that has not received any bytes yet
    pub fn zero(total: u64) -> Self {
        Self::new(0, total, 0.0)
    }

    /// Percent rounded to the nearest integer, for display
    pub fn rounded_percent(&self) -> u8 {
        self.percent.clamp(0.0, 100.0).round() as u8
    }

    pub fn transferred_mb(&self) -> f64 {
        self.transferred_bytes as f64 / BYTES_PER_MB
    }

    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_MB
    }
}

/// Format a transfer rate as "512.0 KB/s" or "1.4 MB/s"
pub fn format_throughput(bytes_per_second: f64) -> String {
    if bytes_per_second >= BYTES_PER_MB {
        format!("{:.1} MB/s", bytes_per_second / BYTES_PER_MB)
    } else {
        format!("{:.1} KB/s", bytes_per_second / 1024.0)
    }
}
