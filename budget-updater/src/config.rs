//! Update configuration
//!
//! Loaded from the `updates` section of the host configuration file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Update system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Whether update checks run at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base URL of the release feed (directory holding latest.yml)
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Directory installers are downloaded into
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Offer releases older than the running version
    #[serde(default)]
    pub allow_downgrade: bool,

    /// Offer prerelease versions (e.g. 2.1.0-beta.1)
    #[serde(default)]
    pub allow_prerelease: bool,

    /// Delay before the startup check (e.g., "2s", "1m")
    #[serde(default = "default_startup_check_delay")]
    pub startup_check_delay: String,
}

fn default_enabled() -> bool {
    true
}

fn default_feed_url() -> String {
    "https://github.com/budget-tool/budget-tool/releases/latest/download".to_string()
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("budget-tool-updates")
}

fn default_startup_check_delay() -> String {
    "2s".to_string()
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            feed_url: default_feed_url(),
            staging_dir: default_staging_dir(),
            allow_downgrade: false,
            allow_prerelease: false,
            startup_check_delay: default_startup_check_delay(),
        }
    }
}

impl UpdateConfig {
    /// Parse the startup delay string to a duration
    pub fn startup_check_delay_duration(&self) -> Duration {
        parse_duration(&self.startup_check_delay).unwrap_or(Duration::from_secs(2))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.feed_url.is_empty() {
            return Err("Update feed URL cannot be empty".to_string());
        }

        if !self.feed_url.starts_with("http://") && !self.feed_url.starts_with("https://") {
            return Err(format!(
                "Invalid feed URL '{}'. Must start with http:// or https://",
                self.feed_url
            ));
        }

        if parse_duration(&self.startup_check_delay).is_none() {
            return Err(format!(
                "Invalid startup check delay '{}'. Use format like '2s', '1m'",
                self.startup_check_delay
            ));
        }

        Ok(())
    }
}

/// Parse a duration string like "500ms", "2s", "30m", "1h"
///
/// Returns `None` for unknown units and for values that overflow.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse().ok().map(Duration::from_millis);
    }

    let (num, multiplier) = if let Some(num) = s.strip_suffix('s') {
        (num, 1)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, 3600)
    } else {
        return None;
    };

    let num: u64 = num.parse().ok()?;
    num.checked_mul(multiplier).map(Duration::from_secs)
}
