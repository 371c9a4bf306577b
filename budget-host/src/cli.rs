//! Command-line argument parsing.

use clap::Parser;

/// Budget Tool host - runs the backend server and keeps the app up to date
#[derive(Parser, Debug)]
#[command(name = "budget-host")]
#[command(about = "Budget Tool host - runs the backend server and keeps the app up to date")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "BUDGET_TOOL_CONFIG")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Log output format (pretty, json)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// URL the backend server listens on
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Do not start the backend server, serve the static UI instead
    #[arg(long)]
    pub no_backend: bool,

    /// Release feed base URL
    #[arg(long, env = "BUDGET_TOOL_FEED_URL")]
    pub feed_url: Option<String>,

    /// Enable development mode (simulated update releases)
    #[arg(long)]
    pub dev: bool,

    /// Disable update checks
    #[arg(long)]
    pub no_updates: bool,
}
