//! Error types and failure classification for the update subsystem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by update capabilities.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// HTTP transport failure (DNS, connect, TLS, timeout).
    #[error("Network request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The feed answered with a non-success status.
    #[error("Update feed returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// The release feed document could not be parsed.
    #[error("Invalid update feed: {0}")]
    InvalidFeed(String),

    /// Downloaded installer does not match the feed's SHA-512.
    #[error("sha512 checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// Local filesystem or process failure.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// `download_update` was called before a release was found.
    #[error("No update available to download")]
    NothingToDownload,

    /// `quit_and_install` was called before a download finished.
    #[error("No downloaded update to install")]
    NothingToInstall,

    /// The event channel to the controller is gone.
    #[error("Update event channel closed")]
    ChannelClosed,
}

impl From<serde_yaml::Error> for UpdateError {
    fn from(e: serde_yaml::Error) -> Self {
        UpdateError::InvalidFeed(e.to_string())
    }
}

/// Result type alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Remediation bucket of a failed update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Integrity,
    Permission,
    Unknown,
}

const NETWORK_MARKERS: &[&str] = &[
    "enotfound",
    "econnrefused",
    "econnreset",
    "etimedout",
    "eai_again",
    "enetunreach",
    "net::err",
    "dns error",
    "getaddrinfo",
    "connection refused",
    "connection reset",
    "error sending request",
    "tcp connect",
    "timed out",
    "socket hang up",
    "network",
];

const INTEGRITY_MARKERS: &[&str] = &["sha512", "sha-512", "checksum", "integrity", "signature"];

const PERMISSION_MARKERS: &[&str] = &[
    "eacces",
    "eperm",
    "permission denied",
    "access is denied",
    "operation not permitted",
];

impl ErrorKind {
    /// Classify raw error text by substring match.
    ///
    /// Integrity markers are tested first: a checksum failure reported
    /// during a network transfer is still a corrupted download.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let matches = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if matches(INTEGRITY_MARKERS) {
            ErrorKind::Integrity
        } else if matches(PERMISSION_MARKERS) {
            ErrorKind::Permission
        } else if matches(NETWORK_MARKERS) {
            ErrorKind::Network
        } else {
            ErrorKind::Unknown
        }
    }

    /// Hint shown next to the error message.
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Check your internet connection and try again.",
            ErrorKind::Integrity => "The download was corrupted. Retry to download it again.",
            ErrorKind::Permission => "Retry with administrator privileges.",
            ErrorKind::Unknown => {
                "Try again later or download the latest release manually."
            }
        }
    }
}

/// A classified update failure, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub message: String,
    pub classified_kind: ErrorKind,
}

impl ErrorInfo {
    /// Classify a raw message reported by the capability.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let classified_kind = ErrorKind::classify(&message);
        Self {
            message,
            classified_kind,
        }
    }

    /// Classify an error using its whole source chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::from_message(error_chain(err))
    }

    pub fn remediation_hint(&self) -> &'static str {
        self.classified_kind.remediation_hint()
    }
}

/// Join an error and its sources into one line.
///
/// reqwest keeps DNS and connect details in `source()`, not in `Display`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
