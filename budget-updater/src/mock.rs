//! Mock update capability for testing and development.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::capability::{CapabilityEvent, EventSink, UpdateCapability};
use crate::error::{Result, UpdateError};
use crate::types::{DownloadProgress, UpdateInfo};

/// Number of times each capability call was made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub checks: usize,
    pub downloads: usize,
    pub installs: usize,
}

/// Release simulated by a scripted mock.
#[derive(Debug, Clone)]
pub struct MockRelease {
    pub info: UpdateInfo,
    /// Number of progress events per download
    pub steps: u32,
    /// Pause between simulated events
    pub step_delay: Duration,
}

/// Mock capability.
///
/// Without a script it only records calls; tests drive it with [`emit`].
/// With a script it plays a full check/download sequence, which is what
/// `--dev` runs against.
///
/// [`emit`]: MockCapability::emit
pub struct MockCapability {
    sink: EventSink,
    calls: Mutex<MockCalls>,
    fail_next: Mutex<Option<String>>,
    script: Option<MockRelease>,
}

impl MockCapability {
    /// Create a mock that only records calls.
    pub fn new(sink: EventSink) -> Self {
        Self {
            sink,
            calls: Mutex::new(MockCalls::default()),
            fail_next: Mutex::new(None),
            script: None,
        }
    }

    /// Create a mock that simulates `release` being published.
    pub fn scripted(sink: EventSink, release: MockRelease) -> Self {
        info!(version = %release.info.version, "Creating scripted mock update capability");
        Self {
            script: Some(release),
            ..Self::new(sink)
        }
    }

    /// Calls made so far.
    pub fn calls(&self) -> MockCalls {
        *lock(&self.calls)
    }

    /// Push an event as if the capability had reported it.
    pub fn emit(&self, event: CapabilityEvent) {
        self.sink.emit(event);
    }

    /// Make the next call fail to start with `message`.
    pub fn fail_next_call(&self, message: impl Into<String>) {
        *lock(&self.fail_next) = Some(message.into());
    }

    fn take_failure(&self) -> Result<()> {
        match lock(&self.fail_next).take() {
            Some(message) => Err(UpdateError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                message,
            ))),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl UpdateCapability for MockCapability {
    async fn check_for_updates(&self) -> Result<()> {
        lock(&self.calls).checks += 1;
        self.take_failure()?;

        if let Some(release) = self.script.clone() {
            let sink = self.sink.clone();
            tokio::spawn(async move {
                sink.emit(CapabilityEvent::CheckingForUpdate);
                tokio::time::sleep(release.step_delay).await;
                sink.emit(CapabilityEvent::UpdateAvailable(release.info));
            });
        }
        Ok(())
    }

    async fn download_update(&self) -> Result<()> {
        lock(&self.calls).downloads += 1;
        self.take_failure()?;

        if let Some(release) = self.script.clone() {
            let sink = self.sink.clone();
            tokio::spawn(async move {
                let total = release.info.download_size_bytes.unwrap_or(0);
                let steps = release.steps.max(1);
                let step_secs = release.step_delay.as_secs_f64().max(0.001);

                for step in 1..=steps {
                    tokio::time::sleep(release.step_delay).await;
                    let transferred = total * u64::from(step) / u64::from(steps);
                    let rate = (total / u64::from(steps)) as f64 / step_secs;
                    sink.emit(CapabilityEvent::DownloadProgress(DownloadProgress::new(
                        transferred,
                        total,
                        rate,
                    )));
                }
                sink.emit(CapabilityEvent::UpdateDownloaded(release.info));
            });
        }
        Ok(())
    }

    async fn quit_and_install(&self) -> Result<()> {
        lock(&self.calls).installs += 1;
        self.take_failure()?;
        debug!("Mock install requested");
        Ok(())
    }
}
