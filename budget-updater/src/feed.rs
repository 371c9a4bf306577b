//! Release feed capability
//!
//! Implements [`UpdateCapability`] against a static release feed as published
//! by the installer build:
//! - `latest.yml` (`latest-mac.yml`, `latest-linux.yml`) describes the newest release
//! - installers are streamed into a staging directory with progress events
//! - each installer is verified against the feed's base64 SHA-512
//!
//! ```text
//! ┌─────────────────┐  latest.yml   ┌─────────────────┐
//! │  Release feed   │◄──────────────┤  FeedCapability │
//! │  (static HTTP)  │  installer    │                 │
//! └─────────────────┘──────────────►│  staging_dir/   │
//!                                   └─────────────────┘
//! ```

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use sha2::{Digest, Sha512};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::capability::{CapabilityEvent, EventSink, UpdateCapability};
use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crate::types::{DownloadProgress, UpdateInfo};

/// Minimum spacing between progress events
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Release description published next to the installers
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseFeed {
    pub version: String,

    #[serde(default)]
    pub files: Vec<ReleaseFile>,

    /// Older feeds name a single installer at the top level
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub sha512: Option<String>,

    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub release_notes: Option<String>,
}

/// One downloadable installer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseFile {
    pub url: String,
    pub sha512: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl ReleaseFeed {
    /// Parse a feed document
    pub fn parse(text: &str) -> Result<Self> {
        let feed: ReleaseFeed = serde_yaml::from_str(text)?;
        if feed.version.trim().is_empty() {
            return Err(UpdateError::InvalidFeed("feed has an empty version".to_string()));
        }
        Ok(feed)
    }

    /// Installer to download: the first listed file, else the legacy top-level entry
    pub fn installer(&self) -> Option<ReleaseFile> {
        if let Some(file) = self.files.first() {
            return Some(file.clone());
        }
        match (&self.path, &self.sha512) {
            (Some(path), Some(sha512)) => Some(ReleaseFile {
                url: path.clone(),
                sha512: sha512.clone(),
                size: None,
            }),
            _ => None,
        }
    }

    pub fn is_prerelease(&self) -> bool {
        self.version.contains('-')
    }

    pub fn to_update_info(&self) -> UpdateInfo {
        UpdateInfo {
            version: self.version.trim_start_matches('v').to_string(),
            release_notes: self.release_notes.clone(),
            release_date: self.release_date.unwrap_or_else(Utc::now),
            download_size_bytes: self.installer().and_then(|f| f.size),
        }
    }
}

/// Feed file for the current platform
pub fn feed_file_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "latest-mac.yml"
    } else if cfg!(target_os = "linux") {
        "latest-linux.yml"
    } else {
        "latest.yml"
    }
}

/// Compare two semantic version strings.
///
/// Missing parts count as zero; a prerelease sorts before its release.
pub fn compare_versions(v1: &str, v2: &str) -> Ordering {
    let parse = |v: &str| -> ((u32, u32, u32), bool) {
        let v = v.trim().trim_start_matches('v');
        let (core, pre) = match v.split_once('-') {
            Some((core, _)) => (core, true),
            None => (v, false),
        };
        let parts: Vec<&str> = core.split('.').collect();
        (
            (
                parts.first().and_then(|s| s.parse().ok()).unwrap_or(0),
                parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0),
                parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(0),
            ),
            pre,
        )
    };

    let (core1, pre1) = parse(v1);
    let (core2, pre2) = parse(v2);

    // `!pre` so that a release (true) outranks a prerelease (false)
    (core1, !pre1).cmp(&(core2, !pre2))
}

/// Update capability backed by a release feed.
pub struct FeedCapability {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    config: UpdateConfig,
    current_version: String,
    client: reqwest::Client,
    sink: EventSink,
    /// Release offered by the last check
    offered: RwLock<Option<ReleaseFeed>>,
    /// Verified installer on disk
    downloaded: RwLock<Option<PathBuf>>,
}

impl FeedCapability {
    /// Create a capability for the running `current_version`.
    pub fn new(
        config: UpdateConfig,
        current_version: impl Into<String>,
        sink: EventSink,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300)) // large installers
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(FeedInner {
                config,
                current_version: current_version.into(),
                client,
                sink,
                offered: RwLock::new(None),
                downloaded: RwLock::new(None),
            }),
        })
    }

    /// URL of the feed document
    pub fn feed_url(&self) -> String {
        self.inner.resolve(feed_file_name())
    }
}

impl FeedInner {
    fn resolve(&self, file: &str) -> String {
        if file.starts_with("http://") || file.starts_with("https://") {
            file.to_string()
        } else {
            format!("{}/{}", self.config.feed_url.trim_end_matches('/'), file)
        }
    }

    /// Whether `feed` should be offered to the user
    fn should_offer(&self, feed: &ReleaseFeed) -> bool {
        if feed.is_prerelease() && !self.config.allow_prerelease {
            debug!(version = %feed.version, "Skipping prerelease");
            return false;
        }
        match compare_versions(&feed.version, &self.current_version) {
            Ordering::Greater => true,
            Ordering::Less => self.config.allow_downgrade,
            Ordering::Equal => false,
        }
    }

    #[instrument(skip(self))]
    async fn fetch_feed(&self) -> Result<ReleaseFeed> {
        let url = self.resolve(feed_file_name());
        info!(url = %url, "Fetching release feed");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let feed = ReleaseFeed::parse(&response.text().await?)?;
        info!(version = %feed.version, "Release feed fetched");
        Ok(feed)
    }

    async fn run_check(&self) {
        self.sink.emit(CapabilityEvent::CheckingForUpdate);

        match self.fetch_feed().await {
            Ok(feed) => {
                let info = feed.to_update_info();
                if self.should_offer(&feed) {
                    info!(
                        current = %self.current_version,
                        latest = %info.version,
                        "Update available"
                    );
                    *self.offered.write().await = Some(feed);
                    self.sink.emit(CapabilityEvent::UpdateAvailable(info));
                } else {
                    info!(current = %self.current_version, "No update available");
                    *self.offered.write().await = None;
                    self.sink.emit(CapabilityEvent::UpdateNotAvailable(Some(info)));
                }
            }
            Err(e) => {
                error!(error = %e, "Update check failed");
                self.sink.emit_error(&e);
            }
        }
    }

    #[instrument(skip(self, feed), fields(version = %feed.version))]
    async fn download(&self, feed: ReleaseFeed) -> Result<PathBuf> {
        let installer = feed
            .installer()
            .ok_or_else(|| UpdateError::InvalidFeed("feed lists no installer".to_string()))?;
        let url = self.resolve(&installer.url);
        let file_name = installer
            .url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("installer");

        fs::create_dir_all(&self.config.staging_dir).await?;
        let dest_path = self.config.staging_dir.join(file_name);

        info!(url = %url, dest = %dest_path.display(), "Downloading installer");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        // 0 when neither the server nor the feed gives a size; progress stays at 0%
        let total = response.content_length().or(installer.size).unwrap_or(0);
        let mut file = File::create(&dest_path).await?;
        let mut stream = response.bytes_stream();

        let started = Instant::now();
        let mut last_report: Option<Instant> = None;
        let mut transferred: u64 = 0;
        let rate = |transferred: u64| transferred as f64 / started.elapsed().as_secs_f64().max(0.001);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            transferred += chunk.len() as u64;

            if last_report.map_or(true, |t| t.elapsed() >= PROGRESS_INTERVAL) {
                self.sink.emit(CapabilityEvent::DownloadProgress(DownloadProgress::new(
                    transferred,
                    total,
                    rate(transferred),
                )));
                last_report = Some(Instant::now());
            }
        }
        file.flush().await?;
        drop(file);

        // The stream has ended, so the size is now known
        let final_total = if total == 0 { transferred } else { total };
        self.sink.emit(CapabilityEvent::DownloadProgress(DownloadProgress::new(
            transferred,
            final_total,
            rate(transferred),
        )));

        if let Err(e) = verify_sha512(&dest_path, &installer.sha512).await {
            if let Err(remove_err) = fs::remove_file(&dest_path).await {
                warn!(error = %remove_err, "Failed to remove corrupted installer");
            }
            return Err(e);
        }
        mark_executable(&dest_path).await?;

        info!(path = %dest_path.display(), bytes = transferred, "Installer downloaded and verified");
        Ok(dest_path)
    }
}

#[async_trait]
impl UpdateCapability for FeedCapability {
    async fn check_for_updates(&self) -> Result<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run_check().await });
        Ok(())
    }

    async fn download_update(&self) -> Result<()> {
        let feed = self
            .inner
            .offered
            .read()
            .await
            .clone()
            .ok_or(UpdateError::NothingToDownload)?;

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let info = feed.to_update_info();
            match inner.download(feed).await {
                Ok(path) => {
                    *inner.downloaded.write().await = Some(path);
                    inner.sink.emit(CapabilityEvent::UpdateDownloaded(info));
                }
                Err(e) => {
                    error!(error = %e, "Installer download failed");
                    inner.sink.emit_error(&e);
                }
            }
        });
        Ok(())
    }

    async fn quit_and_install(&self) -> Result<()> {
        let path = self
            .inner
            .downloaded
            .read()
            .await
            .clone()
            .ok_or(UpdateError::NothingToInstall)?;

        info!(installer = %path.display(), "Launching installer");
        launch_installer(&path)?;
        Ok(())
    }
}

/// Staged files are created 0644; installers must be runnable.
async fn mark_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        fs::set_permissions(path, perms).await?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn launch_installer(path: &Path) -> Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        let mut open = std::process::Command::new("open");
        open.arg(path);
        open
    } else {
        std::process::Command::new(path)
    };
    command.spawn()?;
    Ok(())
}

/// Verify the base64 SHA-512 of a downloaded file
#[instrument]
pub async fn verify_sha512(path: &Path, expected: &str) -> Result<()> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha512::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let actual = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());
    if actual != expected.trim() {
        error!(
            expected = %expected,
            actual = %actual,
            path = %path.display(),
            "Checksum mismatch"
        );
        return Err(UpdateError::ChecksumMismatch {
            file: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        });
    }

    debug!(path = %path.display(), "Checksum verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::event_channel;
    use crate::error::{ErrorInfo, ErrorKind};
    use tokio::sync::mpsc;

    const FEED: &str = r#"
version: 2.1.0
files:
  - url: BudgetTool-Setup-2.1.0.exe
    sha512: c2hhNTEyLXBsYWNlaG9sZGVy
    size: 52428800
path: BudgetTool-Setup-2.1.0.exe
sha512: c2hhNTEyLXBsYWNlaG9sZGVy
releaseDate: '2024-05-01T12:00:00.000Z'
releaseNotes: Faster dashboards
"#;

    /// For policy tests that never emit; the receiver is dropped.
    fn capability(config: UpdateConfig, current: &str) -> FeedCapability {
        let (sink, _rx) = event_channel();
        FeedCapability::new(config, current, sink).unwrap()
    }

    #[test]
    fn test_parse_feed() {
        let feed = ReleaseFeed::parse(FEED).unwrap();
        let info = feed.to_update_info();

        assert_eq!(info.version, "2.1.0");
        assert_eq!(info.download_size_bytes, Some(52_428_800));
        assert_eq!(info.release_notes.as_deref(), Some("Faster dashboards"));
        assert_eq!(info.release_date.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(feed.installer().unwrap().url, "BudgetTool-Setup-2.1.0.exe");
    }

    #[test]
    fn test_parse_legacy_feed() {
        let feed =
            ReleaseFeed::parse("version: 1.2.0\npath: setup.exe\nsha512: abc\n").unwrap();
        let installer = feed.installer().unwrap();
        assert_eq!(installer.url, "setup.exe");
        assert_eq!(installer.size, None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ReleaseFeed::parse("<html>404</html>"),
            Err(UpdateError::InvalidFeed(_))
        ));
    }

    #[test]
    fn test_version_comparison() {
        assert_eq!(compare_versions("2.1.0", "2.0.9"), Ordering::Greater);
        assert_eq!(compare_versions("v1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("0.1.0", "0.0.99"), Ordering::Greater);
        assert_eq!(compare_versions("2.1.0-beta.1", "2.1.0"), Ordering::Less);
        assert_eq!(compare_versions("2.1", "2.1.0"), Ordering::Equal);
    }

    #[test]
    fn test_offer_policy() {
        let cap = capability(UpdateConfig::default(), "2.0.0");
        let feed = |v: &str| ReleaseFeed::parse(&format!("version: {}\n", v)).unwrap();

        assert!(cap.inner.should_offer(&feed("2.1.0")));
        assert!(!cap.inner.should_offer(&feed("2.0.0")));
        assert!(!cap.inner.should_offer(&feed("1.9.0")));
        assert!(!cap.inner.should_offer(&feed("2.2.0-beta.1")));

        let permissive = capability(
            UpdateConfig {
                allow_downgrade: true,
                allow_prerelease: true,
                ..UpdateConfig::default()
            },
            "2.0.0",
        );
        assert!(permissive.inner.should_offer(&feed("1.9.0")));
        assert!(permissive.inner.should_offer(&feed("2.2.0-beta.1")));
    }

    #[test]
    fn test_feed_url_resolution() {
        let cap = capability(
            UpdateConfig {
                feed_url: "https://updates.example.com/budget/".to_string(),
                ..UpdateConfig::default()
            },
            "1.0.0",
        );
        assert_eq!(
            cap.feed_url(),
            format!("https://updates.example.com/budget/{}", feed_file_name())
        );
        assert_eq!(
            cap.inner.resolve("https://cdn.example.com/setup.exe"),
            "https://cdn.example.com/setup.exe"
        );
    }

    #[tokio::test]
    async fn test_verify_sha512() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.exe");
        tokio::fs::write(&path, b"installer bytes").await.unwrap();

        let expected =
            base64::engine::general_purpose::STANDARD.encode(Sha512::digest(b"installer bytes"));
        assert!(verify_sha512(&path, &expected).await.is_ok());

        let err = verify_sha512(&path, "bm90LXRoZS1oYXNo").await.unwrap_err();
        assert_eq!(ErrorInfo::from_error(&err).classified_kind, ErrorKind::Integrity);
    }

    #[tokio::test]
    async fn test_download_without_offer_fails_to_start() {
        let cap = capability(UpdateConfig::default(), "1.0.0");
        assert!(matches!(
            cap.download_update().await,
            Err(UpdateError::NothingToDownload)
        ));
        assert!(matches!(
            cap.quit_and_install().await,
            Err(UpdateError::NothingToInstall)
        ));
    }

    const INSTALLER: &[u8] = b"#!/bin/sh\necho installed > \"$0.done\"\n";
    const INSTALLER_NAME: &str = "BudgetTool-2.1.0.sh";

    fn sha512_base64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(Sha512::digest(bytes))
    }

    fn release_feed(sha512: &str, size: Option<usize>) -> Vec<u8> {
        let mut feed = format!(
            "version: 2.1.0\nfiles:\n  - url: {}\n    sha512: {}\n",
            INSTALLER_NAME, sha512
        );
        if let Some(size) = size {
            feed.push_str(&format!("    size: {}\n", size));
        }
        feed.push_str("releaseDate: '2024-05-01T12:00:00.000Z'\n");
        feed.into_bytes()
    }

    /// Serve `routes` over HTTP on a local port. Without `content_length`
    /// the body ends when the connection closes.
    async fn serve(routes: Vec<(String, Vec<u8>)>, content_length: bool) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let request = String::from_utf8_lossy(&request).to_string();
                    let path = request.split_whitespace().nth(1).unwrap_or("/");
                    let (status, body) = match routes.iter().find(|(route, _)| route == path) {
                        Some((_, body)) => ("200 OK", body.clone()),
                        None => ("404 Not Found", Vec::new()),
                    };

                    let mut head = format!("HTTP/1.1 {}\r\nconnection: close\r\n", status);
                    if content_length {
                        head.push_str(&format!("content-length: {}\r\n", body.len()));
                    }
                    head.push_str("\r\n");
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        url
    }

    async fn serve_release(feed_sha512: &str, size: Option<usize>, content_length: bool) -> String {
        serve(
            vec![
                (format!("/{}", feed_file_name()), release_feed(feed_sha512, size)),
                (format!("/{}", INSTALLER_NAME), INSTALLER.to_vec()),
            ],
            content_length,
        )
        .await
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<CapabilityEvent>) -> CapabilityEvent {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no capability event")
            .expect("event channel closed")
    }

    /// Run a check then a download, returning the progress reports and the
    /// event that ended the download.
    async fn check_and_download(
        cap: &FeedCapability,
        rx: &mut mpsc::UnboundedReceiver<CapabilityEvent>,
    ) -> (Vec<DownloadProgress>, CapabilityEvent) {
        cap.check_for_updates().await.unwrap();
        assert_eq!(next_event(rx).await, CapabilityEvent::CheckingForUpdate);
        match next_event(rx).await {
            CapabilityEvent::UpdateAvailable(info) => assert_eq!(info.version, "2.1.0"),
            other => panic!("unexpected event {:?}", other),
        }

        cap.download_update().await.unwrap();
        let mut progress = Vec::new();
        loop {
            match next_event(rx).await {
                CapabilityEvent::DownloadProgress(p) => progress.push(p),
                other => return (progress, other),
            }
        }
    }

    fn staged_capability(
        url: String,
        staging: &Path,
    ) -> (FeedCapability, mpsc::UnboundedReceiver<CapabilityEvent>) {
        let (sink, rx) = event_channel();
        let config = UpdateConfig {
            feed_url: url,
            staging_dir: staging.to_path_buf(),
            ..UpdateConfig::default()
        };
        (FeedCapability::new(config, "2.0.0", sink).unwrap(), rx)
    }

    #[tokio::test]
    async fn test_download_verifies_and_stages_installer() {
        let url = serve_release(&sha512_base64(INSTALLER), Some(INSTALLER.len()), true).await;
        let staging = tempfile::tempdir().unwrap();
        let (cap, mut rx) = staged_capability(url, staging.path());

        let (progress, end) = check_and_download(&cap, &mut rx).await;
        match end {
            CapabilityEvent::UpdateDownloaded(info) => assert_eq!(info.version, "2.1.0"),
            other => panic!("unexpected event {:?}", other),
        }

        let last = progress.last().unwrap();
        assert_eq!(last.percent, 100.0);
        assert_eq!(last.transferred_bytes, INSTALLER.len() as u64);
        assert_eq!(last.total_bytes, INSTALLER.len() as u64);

        let staged = staging.path().join(INSTALLER_NAME);
        assert_eq!(std::fs::read(&staged).unwrap(), INSTALLER);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_staged_installer_can_be_launched() {
        use std::os::unix::fs::PermissionsExt;

        let url = serve_release(&sha512_base64(INSTALLER), Some(INSTALLER.len()), true).await;
        let staging = tempfile::tempdir().unwrap();
        let (cap, mut rx) = staged_capability(url, staging.path());

        let (_, end) = check_and_download(&cap, &mut rx).await;
        assert!(matches!(end, CapabilityEvent::UpdateDownloaded(_)));

        let staged = staging.path().join(INSTALLER_NAME);
        let mode = std::fs::metadata(&staged).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        cap.quit_and_install().await.unwrap();

        let marker = PathBuf::from(format!("{}.done", staged.display()));
        let deadline = Instant::now() + Duration::from_secs(10);
        while !marker.exists() {
            assert!(Instant::now() < deadline, "installer did not run");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_corrupted_download_is_removed() {
        let url = serve_release(&sha512_base64(b"another build"), Some(INSTALLER.len()), true).await;
        let staging = tempfile::tempdir().unwrap();
        let (cap, mut rx) = staged_capability(url, staging.path());

        let (_, end) = check_and_download(&cap, &mut rx).await;
        match end {
            CapabilityEvent::Error(message) => {
                assert_eq!(ErrorKind::classify(&message), ErrorKind::Integrity);
            }
            other => panic!("unexpected event {:?}", other),
        }

        assert!(!staging.path().join(INSTALLER_NAME).exists());
        assert!(matches!(
            cap.quit_and_install().await,
            Err(UpdateError::NothingToInstall)
        ));
    }

    #[tokio::test]
    async fn test_unknown_size_is_not_reported_complete_early() {
        let url = serve_release(&sha512_base64(INSTALLER), None, false).await;
        let staging = tempfile::tempdir().unwrap();
        let (cap, mut rx) = staged_capability(url, staging.path());

        let (progress, end) = check_and_download(&cap, &mut rx).await;
        assert!(matches!(end, CapabilityEvent::UpdateDownloaded(_)));

        let (last, during) = progress.split_last().unwrap();
        assert!(!during.is_empty());
        for p in during {
            assert_eq!(p.percent, 0.0);
            assert_eq!(p.total_bytes, 0);
        }
        assert_eq!(last.percent, 100.0);
        assert_eq!(last.total_bytes, INSTALLER.len() as u64);
    }

    #[tokio::test]
    async fn test_unreachable_feed_reports_network_error() {
        let (sink, mut rx) = event_channel();
        let config = UpdateConfig {
            feed_url: "http://127.0.0.1:9".to_string(),
            ..UpdateConfig::default()
        };
        let cap = FeedCapability::new(config, "1.0.0", sink).unwrap();

        cap.check_for_updates().await.unwrap();
        assert_eq!(rx.recv().await, Some(CapabilityEvent::CheckingForUpdate));
        match rx.recv().await {
            Some(CapabilityEvent::Error(message)) => {
                assert_eq!(ErrorKind::classify(&message), ErrorKind::Network);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
