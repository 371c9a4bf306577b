//! Backend server supervisor.
//!
//! Starts the backend server as a child process and waits for it to answer
//! on its URL. When it cannot be started in time the UI is served from the
//! static directory instead.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::BackendConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Where the UI is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSource {
    /// The backend answered on this URL
    Backend(String),
    /// Static files, used when the backend is unavailable
    Static(PathBuf),
}

impl fmt::Display for UiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiSource::Backend(url) => write!(f, "{}", url),
            UiSource::Static(dir) => write!(f, "{}", dir.display()),
        }
    }
}

pub struct BackendSupervisor {
    config: BackendConfig,
    client: reqwest::Client,
    child: Option<Child>,
}

impl BackendSupervisor {
    pub fn new(config: BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(POLL_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            config,
            client,
            child: None,
        }
    }

    /// Whether a backend process is currently owned by the supervisor.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.as_mut().map(|c| c.try_wait()), Some(Ok(None)))
    }

    /// Start the backend and decide where the UI comes from.
    #[instrument(skip(self), fields(url = %self.config.url))]
    pub async fn start(&mut self) -> UiSource {
        if !self.config.enabled {
            info!("Backend disabled, serving static UI");
            return self.static_source();
        }

        let command = self.config.command();
        let mut cmd = Command::new(&command);
        cmd.args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        match cmd.spawn() {
            Ok(child) => {
                info!(
                    command = %command,
                    args = ?self.config.args,
                    pid = child.id(),
                    "Backend server starting"
                );
                self.child = Some(child);
            }
            Err(e) => {
                error!(command = %command, error = %e, "Failed to start backend server");
                return self.static_source();
            }
        }

        let timeout = self.config.startup_timeout_duration();
        if self.wait_ready(timeout).await {
            info!("Backend server ready");
            UiSource::Backend(self.config.url.clone())
        } else {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Backend server not ready, serving static UI"
            );
            self.static_source()
        }
    }

    async fn wait_ready(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    warn!(%status, "Backend server exited during startup");
                    self.child = None;
                    return false;
                }
            }

            if self.is_ready().await {
                return true;
            }

            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Any HTTP response means the server is listening.
    async fn is_ready(&self) -> bool {
        match self.client.get(&self.config.url).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "Backend answered");
                true
            }
            Err(e) => {
                debug!(error = %e, "Backend not answering yet");
                false
            }
        }
    }

    fn static_source(&self) -> UiSource {
        UiSource::Static(self.config.static_dir.clone())
    }

    /// Kill the backend process, if one was started.
    pub async fn stop(&mut self) {
        if !self.is_running() {
            debug!("Backend server not running");
            self.child = None;
            return;
        }
        let Some(mut child) = self.child.take() else {
            return;
        };

        info!(pid = child.id(), "Stopping backend server");
        if let Err(e) = child.kill().await {
            warn!(error = %e, "Failed to stop backend server");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: &str, args: &[&str], url: &str) -> BackendConfig {
        BackendConfig {
            enabled: true,
            command: Some(command.to_string()),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: None,
            url: url.to_string(),
            startup_timeout: "500ms".to_string(),
            static_dir: PathBuf::from("frontend"),
        }
    }

    #[tokio::test]
    async fn test_disabled_backend_serves_static() {
        let mut supervisor = BackendSupervisor::new(BackendConfig {
            enabled: false,
            ..BackendConfig::default()
        });

        assert_eq!(
            supervisor.start().await,
            UiSource::Static(PathBuf::from("frontend"))
        );
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_missing_command_serves_static() {
        let mut supervisor = BackendSupervisor::new(config(
            "budget-tool-no-such-command",
            &[],
            "http://127.0.0.1:9",
        ));

        assert_eq!(
            supervisor.start().await,
            UiSource::Static(PathBuf::from("frontend"))
        );
        assert!(!supervisor.is_running());
        supervisor.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unresponsive_backend_times_out() {
        let mut supervisor =
            BackendSupervisor::new(config("sleep", &["30"], "http://127.0.0.1:9"));

        let started = Instant::now();
        assert_eq!(
            supervisor.start().await,
            UiSource::Static(PathBuf::from("frontend"))
        );
        assert!(started.elapsed() < Duration::from_secs(10));

        assert!(supervisor.is_running());
        supervisor.stop().await;
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backend_exiting_early_serves_static() {
        let mut supervisor = BackendSupervisor::new(config("true", &[], "http://127.0.0.1:9"));

        assert_eq!(
            supervisor.start().await,
            UiSource::Static(PathBuf::from("frontend"))
        );
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_listening_backend_is_used() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let mut supervisor = BackendSupervisor::new(config("sleep", &["30"], &url));
        assert_eq!(supervisor.start().await, UiSource::Backend(url));
        supervisor.stop().await;
    }
}
