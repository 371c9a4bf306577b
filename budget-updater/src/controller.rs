//! Host-side update controller.
//!
//! Owns the single [`UpdateState`] and the update capability. The UI can only
//! reach it through [`Intent`]s, and every state change is mirrored to the UI
//! as a [`Notification`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::capability::{CapabilityEvent, UpdateCapability};
use crate::error::{ErrorInfo, UpdateError};
use crate::state::{LifecycleEvent, UpdateState};
use crate::transport::{HostEndpoint, Intent, Notification, Notifier};

/// Why [`UpdateController::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerExit {
    /// The installer was launched; the host must shut down
    InstallRequested,
    /// Every UI bridge was dropped
    UiDetached,
    /// The capability event channel closed
    CapabilityClosed,
}

/// Single owner of the update lifecycle.
pub struct UpdateController {
    state: UpdateState,
    capability: Arc<dyn UpdateCapability>,
    notifier: Notifier,
}

impl UpdateController {
    pub fn new(capability: Arc<dyn UpdateCapability>, notifier: Notifier) -> Self {
        Self {
            state: UpdateState::Idle,
            capability,
            notifier,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    /// Start an update check.
    ///
    /// Ignored while a check or download is outstanding. Returns whether the
    /// check was started.
    #[instrument(skip(self), fields(state = self.state.name()))]
    pub async fn check(&mut self) -> bool {
        if self.state.is_busy() {
            debug!("Update check or download already in progress, ignoring check");
            return false;
        }
        if !self.apply(&LifecycleEvent::CheckStarted) {
            warn!("Update check not allowed from current state");
            return false;
        }

        info!("Checking for updates");
        if let Err(e) = self.capability.check_for_updates().await {
            self.fail(&e, LifecycleEvent::Failure);
        }
        true
    }

    /// Download the offered release. Only valid from `Available`.
    #[instrument(skip(self), fields(state = self.state.name()))]
    pub async fn download(&mut self) -> bool {
        if !matches!(self.state, UpdateState::Available(_)) {
            warn!("Download requested without an available update, ignoring");
            return false;
        }
        self.apply(&LifecycleEvent::DownloadAccepted);

        info!("Downloading update");
        if let Err(e) = self.capability.download_update().await {
            self.fail(&e, LifecycleEvent::Failure);
        }
        true
    }

    /// Drop the offered release and go back to idle.
    pub fn decline(&mut self) -> bool {
        if !matches!(self.state, UpdateState::Available(_)) {
            debug!(state = self.state.name(), "Nothing to decline");
            return false;
        }
        info!("Update declined");
        self.apply(&LifecycleEvent::Declined)
    }

    /// Launch the installer. Only valid from `Downloaded`.
    ///
    /// Returns true when the host must now exit.
    #[instrument(skip(self), fields(state = self.state.name()))]
    pub async fn install(&mut self) -> bool {
        let version = match &self.state {
            UpdateState::Downloaded(info) => info.version.clone(),
            _ => {
                warn!("Install requested without a downloaded update, ignoring");
                return false;
            }
        };

        info!(version = %version, "Installing update and restarting");
        match self.capability.quit_and_install().await {
            Ok(()) => true,
            Err(e) => {
                self.fail(&e, LifecycleEvent::InstallFailed);
                false
            }
        }
    }

    /// Dispatch a UI intent. Returns true when the host must exit.
    pub async fn handle_intent(&mut self, intent: Intent) -> bool {
        debug!(?intent, state = self.state.name(), "Update intent received");
        match intent {
            Intent::Check => {
                self.check().await;
                false
            }
            Intent::Download => {
                self.download().await;
                false
            }
            Intent::Decline => {
                self.decline();
                false
            }
            Intent::Install => self.install().await,
        }
    }

    /// Feed one capability event through the state machine.
    pub fn handle_capability_event(&mut self, event: CapabilityEvent) {
        let duplicate_check = matches!(event, CapabilityEvent::CheckingForUpdate)
            && matches!(self.state, UpdateState::Checking);
        let lifecycle_event = event.into_lifecycle_event();

        if let LifecycleEvent::Progress(progress) = &lifecycle_event {
            debug!(
                percent = progress.rounded_percent(),
                transferred_mb = format!("{:.1}", progress.transferred_mb()),
                total_mb = format!("{:.1}", progress.total_mb()),
                "Download progress"
            );
        }

        if !self.apply(&lifecycle_event) && !duplicate_check {
            warn!(
                state = self.state.name(),
                event = ?lifecycle_event,
                "Ignoring capability event not valid in current state"
            );
        }
    }

    /// Serve intents and capability events until install or detach.
    ///
    /// Each intent or event is handled to completion before the next one is
    /// taken, so the state is never mutated concurrently.
    pub async fn run(
        mut self,
        mut host: HostEndpoint,
        mut events: mpsc::UnboundedReceiver<CapabilityEvent>,
    ) -> ControllerExit {
        info!("Update controller started");

        loop {
            tokio::select! {
                intent = host.next_intent() => {
                    let Some(intent) = intent else {
                        info!("Update UI detached, stopping controller");
                        return ControllerExit::UiDetached;
                    };
                    if self.handle_intent(intent).await {
                        return ControllerExit::InstallRequested;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Update capability event channel closed");
                        return ControllerExit::CapabilityClosed;
                    };
                    self.handle_capability_event(event);
                }
            }
        }
    }

    /// Apply a lifecycle event; notify the UI if the state changed.
    fn apply(&mut self, event: &LifecycleEvent) -> bool {
        let Some(next) = self.state.transition(event) else {
            return false;
        };

        if next.name() != self.state.name() {
            info!(from = self.state.name(), to = next.name(), "Update state changed");
        }
        self.state = next;

        for notification in self.notifications_for(event) {
            self.notifier.send(notification);
        }
        true
    }

    fn notifications_for(&self, event: &LifecycleEvent) -> Vec<Notification> {
        match (&self.state, event) {
            (UpdateState::Idle, _) => vec![Notification::Idle],
            (UpdateState::Checking, _) => vec![Notification::CheckingStarted],
            (UpdateState::Available(info), _) => vec![Notification::UpdateAvailable(info.clone())],
            (UpdateState::Downloading { progress, .. }, LifecycleEvent::DownloadAccepted) => vec![
                Notification::DownloadStarted,
                Notification::DownloadProgress(progress.clone()),
            ],
            (UpdateState::Downloading { progress, .. }, _) => {
                vec![Notification::DownloadProgress(progress.clone())]
            }
            (UpdateState::Downloaded(info), _) => vec![Notification::Downloaded(info.clone())],
            (UpdateState::Failed(error), _) => vec![Notification::Error(error.clone())],
        }
    }

    fn fail(&mut self, err: &UpdateError, event: fn(ErrorInfo) -> LifecycleEvent) {
        let info = ErrorInfo::from_error(err);
        error!(
            error = %info.message,
            kind = ?info.classified_kind,
            "Update operation failed"
        );
        self.apply(&event(info));
    }
}
