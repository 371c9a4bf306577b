//! # Budget Tool Common
//!
//! Shared utilities for the Budget Tool host components.
//!
//! ## Logging
//!
//! ```rust,no_run
//! use budget_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Pretty).unwrap();
//! tracing::info!(version = "1.0.0", "Host starting");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, init_logging_pretty, LogFormat};
