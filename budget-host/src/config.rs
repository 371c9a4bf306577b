//! Configuration management for the host.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use budget_updater::config::parse_duration;
use budget_updater::UpdateConfig;
use directories::ProjectDirs;
use serde::Deserialize;
use tracing::info;

use crate::cli::Args;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend server process
    pub backend: BackendConfig,
    /// Update checks and downloads
    pub updates: UpdateConfig,
    /// Simulate update releases instead of querying the feed
    pub dev: bool,
}

impl Config {
    /// Default location of the config file for the current user.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "budget-tool", "budget-tool")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Build the effective configuration.
    ///
    /// An explicit `--config` must exist. Otherwise `default_path` is used
    /// when present, and defaults when not. A file that exists but does not
    /// parse is an error either way. Validation runs after CLI overrides.
    pub fn resolve(args: &Args, default_path: Option<PathBuf>) -> Result<Self> {
        let config = match &args.config {
            Some(config_path) => {
                let cfg = Self::load(config_path)?;
                info!(config_path = %config_path, "Configuration loaded");
                cfg
            }
            None => match default_path {
                Some(path) if path.exists() => {
                    let cfg = Self::load(&path)?;
                    info!(config_path = %path.display(), "Configuration loaded from default location");
                    cfg
                }
                _ => {
                    info!("No config file found, using CLI arguments and defaults");
                    Self::default()
                }
            },
        };

        let config = config.with_cli_overrides(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref url) = args.backend_url {
            self.backend.url = url.clone();
        }

        if args.no_backend {
            self.backend.enabled = false;
        }

        if let Some(ref feed_url) = args.feed_url {
            self.updates.feed_url = feed_url.clone();
        }

        if args.no_updates {
            self.updates.enabled = false;
        }

        if args.dev {
            self.dev = true;
        }

        self
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.backend
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid backend configuration: {}", e))?;
        self.updates
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid updates configuration: {}", e))?;
        Ok(())
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Start the backend server at launch
    pub enabled: bool,
    /// Interpreter or executable to run (platform python when unset)
    pub command: Option<String>,
    /// Arguments passed to the command
    pub args: Vec<String>,
    /// Working directory of the backend process
    pub working_dir: Option<PathBuf>,
    /// URL the backend serves the UI on
    pub url: String,
    /// How long to wait for the backend to answer (e.g., "3s")
    pub startup_timeout: String,
    /// UI files served when the backend is not available
    pub static_dir: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            args: vec!["app.py".to_string()],
            working_dir: Some(PathBuf::from("server")),
            url: "http://localhost:5000".to_string(),
            startup_timeout: "3s".to_string(),
            static_dir: PathBuf::from("frontend"),
        }
    }
}

impl BackendConfig {
    /// Command to launch, falling back to the platform's python.
    pub fn command(&self) -> String {
        self.command.clone().unwrap_or_else(|| {
            if cfg!(windows) {
                "python".to_string()
            } else {
                "python3".to_string()
            }
        })
    }

    pub fn startup_timeout_duration(&self) -> Duration {
        parse_duration(&self.startup_timeout).unwrap_or(Duration::from_secs(3))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(format!(
                "Invalid backend URL '{}'. Must start with http:// or https://",
                self.url
            ));
        }

        if parse_duration(&self.startup_timeout).is_none() {
            return Err(format!(
                "Invalid startup timeout '{}'. Use format like '3s', '1m'",
                self.startup_timeout
            ));
        }

        if matches!(&self.command, Some(c) if c.trim().is_empty()) {
            return Err("Backend command cannot be empty".to_string());
        }

        Ok(())
    }
}
