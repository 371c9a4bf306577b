//! Update lifecycle state machine
//!
//! `UpdateState::transition` is the only place lifecycle edges are defined.
//! It is a pure function so the controller, tests and any future capability
//! share one table.

use serde::{Deserialize, Serialize};

use crate::error::ErrorInfo;
use crate::types::{DownloadProgress, UpdateInfo};

/// Current phase of the update process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateState {
    /// No update operation in progress
    #[default]
    Idle,

    /// Asking the feed for a newer release
    Checking,

    /// Newer release found, waiting for the user
    Available(UpdateInfo),

    /// Installer download in progress
    Downloading {
        info: UpdateInfo,
        progress: DownloadProgress,
    },

    /// Installer downloaded and verified
    Downloaded(UpdateInfo),

    /// Last operation failed
    Failed(ErrorInfo),
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A check was requested or the capability started one
    CheckStarted,
    /// The feed has nothing newer
    NoUpdate,
    /// The feed offers a newer release
    UpdateFound(UpdateInfo),
    /// The user dismissed the offered release
    Declined,
    /// The user accepted the offered release
    DownloadAccepted,
    /// Raw progress report for the current download
    Progress(DownloadProgress),
    /// Installer is on disk and verified
    DownloadComplete(UpdateInfo),
    /// A check or download failed
    Failure(ErrorInfo),
    /// The downloaded installer could not be launched
    InstallFailed(ErrorInfo),
}

impl UpdateState {
    /// Apply `event`, returning the next state.
    ///
    /// Returns `None` when the edge does not exist; callers must then leave
    /// the current state untouched.
    pub fn transition(&self, event: &LifecycleEvent) -> Option<UpdateState> {
        use LifecycleEvent as E;
        use UpdateState as S;

        match (self, event) {
            (S::Idle | S::Available(_) | S::Failed(_), E::CheckStarted) => Some(S::Checking),

            (S::Checking, E::NoUpdate) => Some(S::Idle),
            (S::Checking, E::UpdateFound(info)) => Some(S::Available(info.clone())),

            (S::Available(_), E::Declined) => Some(S::Idle),
            (S::Available(info), E::DownloadAccepted) => Some(S::Downloading {
                info: info.clone(),
                progress: DownloadProgress::zero(info.download_size_bytes.unwrap_or(0)),
            }),

            (S::Downloading { info, .. }, E::Progress(progress)) => Some(S::Downloading {
                info: info.clone(),
                progress: progress.clone(),
            }),
            (S::Downloading { .. }, E::DownloadComplete(info)) => Some(S::Downloaded(info.clone())),

            // Failed carries no progress, so entering it clears any download
            (S::Checking | S::Downloading { .. }, E::Failure(error)) => {
                Some(S::Failed(error.clone()))
            }
            (S::Downloaded(_), E::InstallFailed(error)) => Some(S::Failed(error.clone())),

            _ => None,
        }
    }

    /// Short lowercase name for logs
    pub fn name(&self) -> &'static str {
        match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::Available(_) => "available",
            UpdateState::Downloading { .. } => "downloading",
            UpdateState::Downloaded(_) => "downloaded",
            UpdateState::Failed(_) => "failed",
        }
    }

    /// A check or download is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(self, UpdateState::Checking | UpdateState::Downloading { .. })
    }

    /// Progress of the current download, if any
    pub fn progress(&self) -> Option<&DownloadProgress> {
        match self {
            UpdateState::Downloading { progress, .. } => Some(progress),
            _ => None,
        }
    }
}
