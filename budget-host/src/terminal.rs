//! Terminal front end for the update banner.
//!
//! Prints the banner every time it changes and turns typed commands into
//! banner clicks.

use std::str::FromStr;

use budget_updater::{Banner, BannerAction, UpdatePresenter};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, warn};

/// A line typed by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Accept,
    Decline,
    Install,
    Retry,
    Dismiss,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accept" | "download" | "y" => Ok(Command::Accept),
            "decline" | "later" | "n" => Ok(Command::Decline),
            "install" | "restart" => Ok(Command::Install),
            "retry" => Ok(Command::Retry),
            "dismiss" => Ok(Command::Dismiss),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(format!("Unknown command '{}'. Type 'help' for a list.", other)),
        }
    }
}

impl Command {
    fn action(&self) -> Option<BannerAction> {
        match self {
            Command::Accept => Some(BannerAction::Accept),
            Command::Decline => Some(BannerAction::Decline),
            Command::Install => Some(BannerAction::Install),
            Command::Retry => Some(BannerAction::Retry),
            Command::Dismiss | Command::Help | Command::Quit => None,
        }
    }
}

pub const HELP: &str = "Commands: accept, decline, install, retry, dismiss, help, quit";

/// How the command loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEnd {
    Quit,
    /// Input was closed without a quit command
    Closed,
}

/// Apply one command to the presenter. Returns the reply to print.
pub fn execute(presenter: &UpdatePresenter, command: Command) -> Option<String> {
    if let Some(action) = command.action() {
        if presenter.click(action) {
            return None;
        }
        return Some(format!("'{}' is not available right now", action.label()));
    }

    match command {
        Command::Dismiss => {
            if presenter.dismiss() {
                None
            } else {
                Some("Nothing to dismiss".to_string())
            }
        }
        Command::Help => Some(HELP.to_string()),
        _ => None,
    }
}

/// Read commands from `input` until `quit` or end of input.
pub async fn run_commands<R>(input: R, presenter: &UpdatePresenter) -> InputEnd
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return InputEnd::Closed,
            Err(e) => {
                warn!(error = %e, "Failed to read command input");
                return InputEnd::Closed;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(Command::Quit) => return InputEnd::Quit,
            Ok(command) => {
                debug!(?command, "Command received");
                if let Some(reply) = execute(presenter, command) {
                    println!("{}", reply);
                }
            }
            Err(e) => println!("{}", e),
        }
    }
}

/// Render a banner change as terminal text.
pub fn render(banner: &Option<Banner>) -> String {
    match banner {
        Some(banner) => banner.to_string(),
        None => String::new(),
    }
}

/// Print the banner every time it changes, until the presenter is dropped.
pub async fn print_banners(mut banners: watch::Receiver<Option<Banner>>) {
    while banners.changed().await.is_ok() {
        let text = render(&banners.borrow_and_update());
        if !text.is_empty() {
            println!("{}", text);
        }
    }
}
