//! Update capability abstraction.
//!
//! A capability performs the actual check, download and install. Calls return
//! as soon as the work is started; outcomes arrive later as
//! [`CapabilityEvent`]s on the channel handed to the implementation.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{ErrorInfo, Result, UpdateError};
use crate::state::LifecycleEvent;
use crate::types::{DownloadProgress, UpdateInfo};

/// Events reported by an update capability.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityEvent {
    /// `checking-for-update`
    CheckingForUpdate,
    /// `update-available`
    UpdateAvailable(UpdateInfo),
    /// `update-not-available`
    UpdateNotAvailable(Option<UpdateInfo>),
    /// `error`, carrying the raw message
    Error(String),
    /// `download-progress`
    DownloadProgress(DownloadProgress),
    /// `update-downloaded`
    UpdateDownloaded(UpdateInfo),
}

impl CapabilityEvent {
    /// Adapt the event into a state machine input.
    pub fn into_lifecycle_event(self) -> LifecycleEvent {
        match self {
            CapabilityEvent::CheckingForUpdate => LifecycleEvent::CheckStarted,
            CapabilityEvent::UpdateAvailable(info) => LifecycleEvent::UpdateFound(info),
            CapabilityEvent::UpdateNotAvailable(_) => LifecycleEvent::NoUpdate,
            CapabilityEvent::Error(message) => {
                LifecycleEvent::Failure(ErrorInfo::from_message(message))
            }
            CapabilityEvent::DownloadProgress(progress) => LifecycleEvent::Progress(progress),
            CapabilityEvent::UpdateDownloaded(info) => LifecycleEvent::DownloadComplete(info),
        }
    }
}

/// Sending half of the capability event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<CapabilityEvent>,
}

impl EventSink {
    pub fn emit(&self, event: CapabilityEvent) {
        if self.tx.send(event).is_err() {
            debug!("Update controller is gone, dropping capability event");
        }
    }

    /// Report a failure with its full source chain.
    pub fn emit_error(&self, err: &UpdateError) {
        self.emit(CapabilityEvent::Error(crate::error::error_chain(err)));
    }
}

/// Create the channel between a capability and the controller.
pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<CapabilityEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

/// Third-party update mechanism as seen by the controller.
///
/// Implementations must not block: start the work and report through the
/// [`EventSink`]. An `Err` return means the work could not even be started.
#[async_trait]
pub trait UpdateCapability: Send + Sync {
    /// Ask the feed whether a newer release exists.
    async fn check_for_updates(&self) -> Result<()>;

    /// Download the release found by the last check.
    async fn download_update(&self) -> Result<()>;

    /// Launch the downloaded installer. The host exits afterwards.
    async fn quit_and_install(&self) -> Result<()>;
}
