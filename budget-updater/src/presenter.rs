//! UI-side update presenter.
//!
//! Mirrors the controller's state from notifications and turns it into a
//! [`Banner`]. User clicks become intents on the bridge; the presenter never
//! changes lifecycle state itself.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::ErrorInfo;
use crate::transport::{Notification, UpdateBridge};
use crate::types::{format_throughput, DownloadProgress, UpdateInfo};

/// Delay before the startup check, giving the host time to finish starting.
pub const DEFAULT_STARTUP_CHECK_DELAY: Duration = Duration::from_secs(2);

const PROGRESS_BAR_WIDTH: usize = 20;

/// Read-only projection of the controller's state
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorState {
    Idle,
    Checking,
    Available(UpdateInfo),
    Downloading {
        version: Option<String>,
        progress: Option<DownloadProgress>,
    },
    Downloaded(UpdateInfo),
    Failed(ErrorInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerTone {
    Info,
    Progress,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerAction {
    Accept,
    Decline,
    Install,
    Retry,
}

impl BannerAction {
    pub fn label(&self) -> &'static str {
        match self {
            BannerAction::Accept => "Download & Install",
            BannerAction::Decline => "Later",
            BannerAction::Install => "Restart & Update",
            BannerAction::Retry => "Retry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionButton {
    pub action: BannerAction,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLine {
    pub percent: u8,
    pub transferred_mb: f64,
    pub total_mb: f64,
    pub throughput: String,
}

/// What the UI shows for the current update state
#[derive(Debug, Clone, PartialEq)]
pub struct Banner {
    pub tone: BannerTone,
    pub title: String,
    pub message: String,
    pub hint: Option<&'static str>,
    pub progress: Option<ProgressLine>,
    pub actions: Vec<ActionButton>,
}

impl Banner {
    fn new(tone: BannerTone, title: &str, message: String) -> Self {
        Self {
            tone,
            title: title.to_string(),
            message,
            hint: None,
            progress: None,
            actions: Vec::new(),
        }
    }

    fn action(mut self, action: BannerAction, enabled: bool) -> Self {
        self.actions.push(ActionButton { action, enabled });
        self
    }

    /// Whether `action` is shown and clickable
    pub fn allows(&self, action: BannerAction) -> bool {
        self.actions.iter().any(|b| b.action == action && b.enabled)
    }
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.tone {
            BannerTone::Info => "info",
            BannerTone::Progress => "....",
            BannerTone::Success => " ok ",
            BannerTone::Error => "fail",
        };
        write!(f, "[{}] {}: {}", tag, self.title, self.message)?;
        if let Some(hint) = self.hint {
            write!(f, " {}", hint)?;
        }
        if let Some(p) = &self.progress {
            let filled = usize::from(p.percent) * PROGRESS_BAR_WIDTH / 100;
            write!(
                f,
                "\n       [{}{}] {:>3}%  {:.1} MB / {:.1} MB  {}",
                "#".repeat(filled),
                "-".repeat(PROGRESS_BAR_WIDTH - filled),
                p.percent,
                p.transferred_mb,
                p.total_mb,
                p.throughput
            )?;
        }
        if !self.actions.is_empty() {
            write!(f, "\n      ")?;
            for button in &self.actions {
                if button.enabled {
                    write!(f, " [{}]", button.label())?;
                } else {
                    write!(f, " ({})", button.label())?;
                }
            }
        }
        Ok(())
    }
}

impl ActionButton {
    fn label(&self) -> &'static str {
        self.action.label()
    }
}

/// Presenter-local view state
#[derive(Debug)]
struct View {
    mirror: MirrorState,
    /// Highest percent shown in the current download session
    shown_percent: f64,
    dismissed: bool,
}

impl View {
    fn new() -> Self {
        Self {
            mirror: MirrorState::Idle,
            shown_percent: 0.0,
            dismissed: false,
        }
    }

    fn apply(&mut self, notification: &Notification) {
        self.dismissed = false;
        match notification {
            Notification::CheckingStarted => self.mirror = MirrorState::Checking,
            Notification::Idle => self.mirror = MirrorState::Idle,
            Notification::UpdateAvailable(info) => {
                self.mirror = MirrorState::Available(info.clone())
            }
            Notification::DownloadStarted => {
                let version = match &self.mirror {
                    MirrorState::Available(info) => Some(info.version.clone()),
                    _ => None,
                };
                self.shown_percent = 0.0;
                self.mirror = MirrorState::Downloading {
                    version,
                    progress: None,
                };
            }
            Notification::DownloadProgress(progress) => self.apply_progress(progress),
            Notification::Downloaded(info) => self.mirror = MirrorState::Downloaded(info.clone()),
            Notification::Error(error) => {
                self.shown_percent = 0.0;
                self.mirror = MirrorState::Failed(error.clone());
            }
        }
    }

    fn apply_progress(&mut self, incoming: &DownloadProgress) {
        match &mut self.mirror {
            MirrorState::Downloading { progress, .. } => {
                if progress.is_some() && incoming.percent < self.shown_percent {
                    debug!(
                        incoming = incoming.percent,
                        shown = self.shown_percent,
                        "Discarding out-of-order download progress"
                    );
                    return;
                }
                self.shown_percent = incoming.percent;
                *progress = Some(incoming.clone());
            }
            _ => {
                // Attached mid-download: the DownloadStarted notification was missed
                self.shown_percent = incoming.percent;
                self.mirror = MirrorState::Downloading {
                    version: None,
                    progress: Some(incoming.clone()),
                };
            }
        }
    }

    fn displayed_percent(&self) -> Option<f64> {
        match &self.mirror {
            MirrorState::Downloading {
                progress: Some(progress),
                ..
            } => Some(progress.percent),
            _ => None,
        }
    }

    fn banner(&self) -> Option<Banner> {
        if self.dismissed {
            return None;
        }

        let banner = match &self.mirror {
            MirrorState::Idle => return None,
            MirrorState::Checking => Banner::new(
                BannerTone::Info,
                "Checking for updates",
                "Looking for a newer version...".to_string(),
            ),
            MirrorState::Available(info) => {
                let mut message = format!("Version {} is available", info.version);
                if let Some(mb) = info.download_size_mb() {
                    message.push_str(&format!(" ({:.1} MB)", mb));
                }
                Banner::new(BannerTone::Info, "Update available", message)
                    .action(BannerAction::Accept, true)
                    .action(BannerAction::Decline, true)
            }
            MirrorState::Downloading { version, progress } => {
                let message = match version {
                    Some(v) => format!("Downloading version {}...", v),
                    None => "Downloading update...".to_string(),
                };
                let mut banner = Banner::new(BannerTone::Progress, "Downloading update", message)
                    .action(BannerAction::Accept, false);
                let progress = progress.clone().unwrap_or_else(|| DownloadProgress::zero(0));
                banner.progress = Some(ProgressLine {
                    percent: progress.rounded_percent(),
                    transferred_mb: progress.transferred_mb(),
                    total_mb: progress.total_mb(),
                    throughput: format_throughput(progress.bytes_per_second),
                });
                banner
            }
            MirrorState::Downloaded(info) => Banner::new(
                BannerTone::Success,
                "Update ready",
                format!(
                    "Version {} has been downloaded. Restart to install it.",
                    info.version
                ),
            )
            .action(BannerAction::Install, true),
            MirrorState::Failed(error) => {
                let mut banner = Banner::new(BannerTone::Error, "Update failed", error.message.clone())
                    .action(BannerAction::Retry, true);
                banner.hint = Some(error.remediation_hint());
                banner
            }
        };
        Some(banner)
    }
}

/// Update presenter bound to one [`UpdateBridge`].
pub struct UpdatePresenter {
    bridge: UpdateBridge,
    view: Arc<Mutex<View>>,
    banner_tx: Arc<watch::Sender<Option<Banner>>>,
}

impl UpdatePresenter {
    /// Register listeners on `bridge`, starting from an empty mirror.
    pub fn attach(bridge: UpdateBridge) -> Self {
        let view = Arc::new(Mutex::new(View::new()));
        let (banner_tx, _) = watch::channel(None);
        let banner_tx = Arc::new(banner_tx);

        let presenter = Self {
            bridge,
            view,
            banner_tx,
        };
        presenter.register_listeners();
        presenter
    }

    fn register_listeners(&self) {
        let update = |view: &Arc<Mutex<View>>, tx: &Arc<watch::Sender<Option<Banner>>>| {
            let view = view.clone();
            let tx = tx.clone();
            move |notification: Notification| {
                let mut view = lock(&view);
                view.apply(&notification);
                tx.send_replace(view.banner());
            }
        };

        let apply = update(&self.view, &self.banner_tx);
        self.bridge
            .on_checking_started(move || apply(Notification::CheckingStarted));

        let apply = update(&self.view, &self.banner_tx);
        self.bridge.on_idle(move || apply(Notification::Idle));

        let apply = update(&self.view, &self.banner_tx);
        self.bridge
            .on_update_available(move |info| apply(Notification::UpdateAvailable(info.clone())));

        let apply = update(&self.view, &self.banner_tx);
        self.bridge
            .on_download_started(move || apply(Notification::DownloadStarted));

        let apply = update(&self.view, &self.banner_tx);
        self.bridge.on_download_progress(move |progress| {
            apply(Notification::DownloadProgress(progress.clone()))
        });

        let apply = update(&self.view, &self.banner_tx);
        self.bridge
            .on_downloaded(move |info| apply(Notification::Downloaded(info.clone())));

        let apply = update(&self.view, &self.banner_tx);
        self.bridge
            .on_error(move |error| apply(Notification::Error(error.clone())));
    }

    /// Current mirrored state
    pub fn mirror(&self) -> MirrorState {
        lock(&self.view).mirror.clone()
    }

    /// Download percent currently on screen
    pub fn displayed_percent(&self) -> Option<f64> {
        lock(&self.view).displayed_percent()
    }

    /// Banner for the current state, `None` when nothing is shown
    pub fn banner(&self) -> Option<Banner> {
        lock(&self.view).banner()
    }

    /// Receiver that changes every time the banner is recomputed
    pub fn subscribe(&self) -> watch::Receiver<Option<Banner>> {
        self.banner_tx.subscribe()
    }

    /// Handle a click on a banner button.
    ///
    /// Buttons that are hidden or disabled are ignored. Returns whether an
    /// intent was sent.
    pub fn click(&self, action: BannerAction) -> bool {
        let allowed = self.banner().map_or(false, |b| b.allows(action));
        if !allowed {
            debug!(?action, "Ignoring click on unavailable update action");
            return false;
        }

        match action {
            BannerAction::Accept => self.bridge.request_download(),
            BannerAction::Decline => self.bridge.request_decline(),
            BannerAction::Install => self.bridge.request_install(),
            BannerAction::Retry => self.bridge.request_check(),
        }
        true
    }

    /// Hide a failure banner. The mirrored state is left as is.
    pub fn dismiss(&self) -> bool {
        let mut view = lock(&self.view);
        if !matches!(view.mirror, MirrorState::Failed(_)) || view.dismissed {
            return false;
        }
        view.dismissed = true;
        self.banner_tx.send_replace(None);
        true
    }

    /// Request one update check after `delay`.
    pub fn schedule_initial_check(&self, delay: Duration) -> JoinHandle<()> {
        let bridge = self.bridge.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!("Requesting startup update check");
            bridge.request_check();
        })
    }

    /// Stop receiving notifications.
    pub fn detach(&self) {
        self.bridge.remove_all_listeners();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::{channel, Intent};

    fn progress(percent: f64) -> DownloadProgress {
        DownloadProgress {
            percent,
            transferred_bytes: (percent * 524_288.0) as u64,
            total_bytes: 52_428_800,
            bytes_per_second: 2_097_152.0,
        }
    }

    #[test]
    fn test_available_banner_offers_accept_and_decline() {
        let mut view = View::new();
        view.apply(&Notification::UpdateAvailable(
            UpdateInfo::new("2.1.0").with_size(52_428_800),
        ));

        let banner = view.banner().unwrap();
        assert_eq!(banner.message, "Version 2.1.0 is available (50.0 MB)");
        assert!(banner.allows(BannerAction::Accept));
        assert!(banner.allows(BannerAction::Decline));
        assert!(!banner.allows(BannerAction::Install));
    }

    #[test]
    fn test_downloading_banner_disables_accept() {
        let mut view = View::new();
        view.apply(&Notification::UpdateAvailable(UpdateInfo::new("2.1.0")));
        view.apply(&Notification::DownloadStarted);
        view.apply(&Notification::DownloadProgress(progress(50.0)));

        let banner = view.banner().unwrap();
        assert_eq!(banner.message, "Downloading version 2.1.0...");
        assert!(!banner.allows(BannerAction::Accept));
        assert!(!banner.allows(BannerAction::Decline));
        let line = banner.progress.unwrap();
        assert_eq!(line.percent, 50);
        assert_eq!(line.total_mb, 50.0);
        assert_eq!(line.throughput, "2.0 MB/s");
    }

    #[test]
    fn test_failed_banner_has_hint_and_retry_only() {
        let mut view = View::new();
        view.apply(&Notification::Error(ErrorInfo::from_message(
            "ENOTFOUND api.example.com",
        )));

        let banner = view.banner().unwrap();
        assert_eq!(banner.tone, BannerTone::Error);
        assert_eq!(banner.hint, Some(ErrorKind::Network.remediation_hint()));
        assert_eq!(
            banner.actions,
            vec![ActionButton {
                action: BannerAction::Retry,
                enabled: true
            }]
        );
    }

    #[test]
    fn test_progress_regression_is_suppressed() {
        let mut view = View::new();
        view.apply(&Notification::DownloadStarted);

        let mut shown = Vec::new();
        for percent in [10.0, 35.0, 20.0, 60.0] {
            view.apply(&Notification::DownloadProgress(progress(percent)));
            shown.push(view.displayed_percent().unwrap());
        }
        assert_eq!(shown, vec![10.0, 35.0, 35.0, 60.0]);
    }

    #[test]
    fn test_new_download_session_resets_progress_floor() {
        let mut view = View::new();
        view.apply(&Notification::DownloadStarted);
        view.apply(&Notification::DownloadProgress(progress(80.0)));
        view.apply(&Notification::Error(ErrorInfo::from_message("ECONNRESET")));
        assert_eq!(view.displayed_percent(), None);

        view.apply(&Notification::DownloadStarted);
        view.apply(&Notification::DownloadProgress(progress(5.0)));
        assert_eq!(view.displayed_percent(), Some(5.0));
    }

    #[test]
    fn test_banner_display() {
        let mut view = View::new();
        view.apply(&Notification::Downloaded(UpdateInfo::new("2.1.0")));
        let text = view.banner().unwrap().to_string();
        assert!(text.contains("Version 2.1.0 has been downloaded"));
        assert!(text.contains("[Restart & Update]"));
    }

    #[tokio::test]
    async fn test_click_sends_intent_only_when_enabled() {
        let (mut host, mut ui) = channel();
        let presenter = UpdatePresenter::attach(ui.bridge.clone());

        assert!(!presenter.click(BannerAction::Accept));

        host.notifier()
            .send(Notification::UpdateAvailable(UpdateInfo::new("2.1.0")));
        ui.pump.drain();

        assert!(presenter.click(BannerAction::Accept));
        assert_eq!(host.next_intent().await, Some(Intent::Download));

        host.notifier().send(Notification::DownloadStarted);
        ui.pump.drain();
        assert!(!presenter.click(BannerAction::Accept));
        assert!(!presenter.click(BannerAction::Decline));
    }

    #[tokio::test]
    async fn test_retry_requests_check() {
        let (mut host, mut ui) = channel();
        let presenter = UpdatePresenter::attach(ui.bridge.clone());

        host.notifier()
            .send(Notification::Error(ErrorInfo::from_message("EACCES")));
        ui.pump.drain();

        assert!(presenter.click(BannerAction::Retry));
        assert_eq!(host.next_intent().await, Some(Intent::Check));
    }

    #[tokio::test]
    async fn test_dismiss_hides_banner_but_keeps_mirror() {
        let (host, mut ui) = channel();
        let presenter = UpdatePresenter::attach(ui.bridge.clone());
        let mut banners = presenter.subscribe();

        host.notifier()
            .send(Notification::Error(ErrorInfo::from_message("boom")));
        ui.pump.drain();
        assert!(banners.has_changed().unwrap());
        assert!(banners.borrow_and_update().is_some());

        assert!(presenter.dismiss());
        assert!(presenter.banner().is_none());
        assert!(matches!(presenter.mirror(), MirrorState::Failed(_)));
        assert!(banners.borrow_and_update().is_none());
        assert!(!presenter.dismiss());
    }

    #[tokio::test]
    async fn test_initial_check_after_delay() {
        let (mut host, ui) = channel();
        let presenter = UpdatePresenter::attach(ui.bridge.clone());

        let handle = presenter.schedule_initial_check(Duration::from_millis(10));
        handle.await.unwrap();

        assert_eq!(host.next_intent().await, Some(Intent::Check));
    }
}
