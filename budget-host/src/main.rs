//! # Budget Tool Host
//!
//! Desktop host for the Budget Tool. Starts the backend server that serves
//! the dashboards and runs the update lifecycle: checking the release feed,
//! offering new versions, downloading and installing them.
//!
//! ## Usage
//! ```bash
//! budget-host --config ~/.config/budget-tool/config.yaml
//! budget-host --dev --no-backend   # simulated release, no python backend
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use budget_common::LogFormat;
use budget_updater::{
    channel, event_channel, ControllerExit, EventSink, FeedCapability, MockCapability,
    MockRelease, UiEndpoint, UpdateCapability, UpdateController, UpdateInfo, UpdatePresenter,
};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info, warn};

mod backend;
mod cli;
mod config;
mod terminal;

use backend::{BackendSupervisor, UiSource};
use cli::Args;
use config::Config;
use terminal::InputEnd;

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let format: LogFormat = args.log_format.parse()?;
    budget_common::init_logging(&args.log_level, format)?;

    info!(version = CURRENT_VERSION, "Starting Budget Tool host");

    let config = load_config(&args)?;

    info!(
        backend = config.backend.enabled,
        backend_url = %config.backend.url,
        updates = config.updates.enabled,
        dev = config.dev,
        "Host configured"
    );

    let mut backend = BackendSupervisor::new(config.backend.clone());
    let source = backend.start().await;
    match &source {
        UiSource::Backend(_) => println!("Budget Tool is running at {}", source),
        UiSource::Static(_) => println!("Budget Tool UI files are in {}", source),
    }

    let result = run(&config).await;

    backend.stop().await;
    info!("Budget Tool host stopped");
    result
}

fn load_config(args: &Args) -> Result<Config> {
    Config::resolve(args, Config::default_path()).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })
}

/// Wire the update pipeline to the terminal and serve it until quit.
async fn run(config: &Config) -> Result<()> {
    let (sink, events) = event_channel();
    let capability = create_capability(config, sink)?;

    let (host, ui) = channel();
    let controller = UpdateController::new(capability, host.notifier());

    let UiEndpoint { bridge, pump } = ui;
    let presenter = UpdatePresenter::attach(bridge);
    tokio::spawn(pump.run());
    tokio::spawn(terminal::print_banners(presenter.subscribe()));
    let mut controller_task = tokio::spawn(controller.run(host, events));

    if config.updates.enabled {
        presenter.schedule_initial_check(config.updates.startup_check_delay_duration());
    } else {
        info!("Update checks disabled");
    }

    println!("{}", terminal::HELP);

    let commands = async {
        let stdin = BufReader::new(tokio::io::stdin());
        if terminal::run_commands(stdin, &presenter).await == InputEnd::Closed {
            info!("Command input closed, press Ctrl+C to quit");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
        _ = commands => {
            info!("Quit requested");
        }
        exit = &mut controller_task => {
            match exit? {
                ControllerExit::InstallRequested => {
                    info!("Installer launched, exiting for the update");
                }
                other => warn!(exit = ?other, "Update controller stopped"),
            }
        }
    }

    presenter.detach();
    drop(presenter);
    if !controller_task.is_finished() {
        controller_task.abort();
    }
    Ok(())
}

fn create_capability(config: &Config, sink: EventSink) -> Result<Arc<dyn UpdateCapability>> {
    if config.dev {
        let version = dev_release_version(CURRENT_VERSION);
        info!(version = %version, "Development mode, simulating an update release");
        let release = MockRelease {
            info: UpdateInfo::new(version)
                .with_size(52_428_800)
                .with_release_notes("Simulated release for development"),
            steps: 20,
            step_delay: Duration::from_millis(150),
        };
        return Ok(Arc::new(MockCapability::scripted(sink, release)));
    }

    let feed = FeedCapability::new(config.updates.clone(), CURRENT_VERSION, sink)?;
    info!(feed_url = %feed.feed_url(), "Using release feed");
    Ok(Arc::new(feed))
}

/// Next minor version after `current`, e.g. 1.0.3 -> 1.1.0.
fn dev_release_version(current: &str) -> String {
    let mut parts = current.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    format!("{}.{}.0", major, minor + 1)
}
