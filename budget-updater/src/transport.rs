//! Update channel between the host and the UI.
//!
//! The UI side only ever sees an [`UpdateBridge`]: four fire-and-forget
//! intents and a fixed set of notification listeners. Nothing else on the
//! host is reachable through it.
//!
//! ```text
//! ┌──────────────────┐  Intent (mpsc)        ┌──────────────────┐
//! │  UpdateBridge    ├──────────────────────►│  HostEndpoint    │
//! │  (UI side)       │                       │  (controller)    │
//! │  listeners  ◄────┤  Notification (mpsc)  │  Notifier        │
//! └──────────────────┘◄──NotificationPump────┴──────────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::ErrorInfo;
use crate::types::{DownloadProgress, UpdateInfo};

/// UI -> host requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Check,
    Download,
    Decline,
    Install,
}

/// Host -> UI notifications
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    CheckingStarted,
    /// Back to idle: nothing newer, or the offer was declined
    Idle,
    UpdateAvailable(UpdateInfo),
    DownloadStarted,
    DownloadProgress(DownloadProgress),
    Downloaded(UpdateInfo),
    Error(ErrorInfo),
}

type Listener = Box<dyn FnMut(&Notification) + Send>;

/// Create a connected host/UI endpoint pair.
pub fn channel() -> (HostEndpoint, UiEndpoint) {
    let (intent_tx, intent_rx) = mpsc::unbounded_channel();
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let listeners: Arc<Mutex<Vec<Listener>>> = Arc::new(Mutex::new(Vec::new()));

    let host = HostEndpoint {
        intents: intent_rx,
        notifier: Notifier { tx: notify_tx },
    };
    let ui = UiEndpoint {
        bridge: UpdateBridge {
            intents: intent_tx,
            listeners: listeners.clone(),
        },
        pump: NotificationPump {
            notifications: notify_rx,
            listeners,
        },
    };

    (host, ui)
}

/// Host half: receives intents, hands out notifiers.
pub struct HostEndpoint {
    intents: mpsc::UnboundedReceiver<Intent>,
    notifier: Notifier,
}

impl HostEndpoint {
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Next intent from the UI, or `None` once every bridge is dropped.
    pub async fn next_intent(&mut self) -> Option<Intent> {
        self.intents.recv().await
    }
}

/// Sends notifications to the UI.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn send(&self, notification: Notification) {
        trace!(?notification, "Sending update notification");
        if self.tx.send(notification).is_err() {
            debug!("UI side is gone, dropping update notification");
        }
    }
}

/// UI half, split into the bridge and the pump that feeds its listeners.
pub struct UiEndpoint {
    pub bridge: UpdateBridge,
    pub pump: NotificationPump,
}

/// The only update surface exposed to the UI.
#[derive(Clone)]
pub struct UpdateBridge {
    intents: mpsc::UnboundedSender<Intent>,
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl UpdateBridge {
    pub fn request_check(&self) {
        self.send(Intent::Check);
    }

    pub fn request_download(&self) {
        self.send(Intent::Download);
    }

    pub fn request_decline(&self) {
        self.send(Intent::Decline);
    }

    pub fn request_install(&self) {
        self.send(Intent::Install);
    }

    fn send(&self, intent: Intent) {
        if self.intents.send(intent).is_err() {
            debug!(?intent, "Host side is gone, dropping update intent");
        }
    }

    pub fn on_checking_started<F>(&self, mut callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.listen(move |n| {
            if let Notification::CheckingStarted = n {
                callback();
            }
        });
    }

    pub fn on_idle<F>(&self, mut callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.listen(move |n| {
            if let Notification::Idle = n {
                callback();
            }
        });
    }

    pub fn on_update_available<F>(&self, mut callback: F)
    where
        F: FnMut(&UpdateInfo) + Send + 'static,
    {
        self.listen(move |n| {
            if let Notification::UpdateAvailable(info) = n {
                callback(info);
            }
        });
    }

    pub fn on_download_started<F>(&self, mut callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.listen(move |n| {
            if let Notification::DownloadStarted = n {
                callback();
            }
        });
    }

    pub fn on_download_progress<F>(&self, mut callback: F)
    where
        F: FnMut(&DownloadProgress) + Send + 'static,
    {
        self.listen(move |n| {
            if let Notification::DownloadProgress(progress) = n {
                callback(progress);
            }
        });
    }

    pub fn on_downloaded<F>(&self, mut callback: F)
    where
        F: FnMut(&UpdateInfo) + Send + 'static,
    {
        self.listen(move |n| {
            if let Notification::Downloaded(info) = n {
                callback(info);
            }
        });
    }

    pub fn on_error<F>(&self, mut callback: F)
    where
        F: FnMut(&ErrorInfo) + Send + 'static,
    {
        self.listen(move |n| {
            if let Notification::Error(error) = n {
                callback(error);
            }
        });
    }

    /// Detach every listener. Later notifications are discarded.
    pub fn remove_all_listeners(&self) {
        let mut listeners = lock(&self.listeners);
        debug!(count = listeners.len(), "Removing update listeners");
        listeners.clear();
    }

    /// Number of attached listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn listen(&self, listener: impl FnMut(&Notification) + Send + 'static) {
        lock(&self.listeners).push(Box::new(listener));
    }
}

/// Delivers notifications to the bridge's listeners in arrival order.
///
/// Listeners run while the listener list is locked; they must not call
/// back into the bridge's listener API.
pub struct NotificationPump {
    notifications: mpsc::UnboundedReceiver<Notification>,
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl NotificationPump {
    /// Deliver notifications until the host side closes.
    pub async fn run(mut self) {
        while self.next().await {}
        debug!("Update notification channel closed");
    }

    /// Wait for and deliver one notification. Returns false when closed.
    pub async fn next(&mut self) -> bool {
        match self.notifications.recv().await {
            Some(notification) => {
                self.dispatch(&notification);
                true
            }
            None => false,
        }
    }

    /// Deliver everything already queued, returning how many were delivered.
    pub fn drain(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(notification) = self.notifications.try_recv() {
            self.dispatch(&notification);
            delivered += 1;
        }
        delivered
    }

    fn dispatch(&self, notification: &Notification) {
        for listener in lock(&self.listeners).iter_mut() {
            listener(notification);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_intents_reach_host_in_order() {
        let (mut host, ui) = channel();

        ui.bridge.request_check();
        ui.bridge.request_download();
        ui.bridge.request_install();

        assert_eq!(host.next_intent().await, Some(Intent::Check));
        assert_eq!(host.next_intent().await, Some(Intent::Download));
        assert_eq!(host.next_intent().await, Some(Intent::Install));
    }

    #[tokio::test]
    async fn test_host_sees_close_when_bridge_dropped() {
        let (mut host, ui) = channel();
        drop(ui);
        assert_eq!(host.next_intent().await, None);
    }

    #[test]
    fn test_listeners_receive_only_their_notification() {
        let (host, mut ui) = channel();
        let available = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let counter = available.clone();
        ui.bridge.on_update_available(move |info| {
            assert_eq!(info.version, "2.1.0");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = errors.clone();
        ui.bridge.on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let notifier = host.notifier();
        notifier.send(Notification::CheckingStarted);
        notifier.send(Notification::UpdateAvailable(UpdateInfo::new("2.1.0")));

        assert_eq!(ui.pump.drain(), 2);
        assert_eq!(available.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_all_listeners_detaches() {
        let (host, mut ui) = channel();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        ui.bridge.on_checking_started(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ui.bridge.listener_count(), 1);

        ui.bridge.remove_all_listeners();
        host.notifier().send(Notification::CheckingStarted);

        assert_eq!(ui.pump.drain(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(ui.bridge.listener_count(), 0);
    }

    #[test]
    fn test_notifier_survives_closed_ui() {
        let (host, ui) = channel();
        drop(ui);
        host.notifier().send(Notification::Idle);
    }
}
