//! # Budget Tool Updater
//!
//! Self-update pipeline for the Budget Tool desktop host.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐ Intent       ┌──────────────────┐ calls   ┌────────────────┐
//! │ UpdatePresenter├─────────────►│ UpdateController ├────────►│ UpdateCapability│
//! │ (UI side)      │◄─────────────┤ (owns state)     │◄────────┤ (feed / mock)  │
//! └────────────────┘ Notification └──────────────────┘ events  └────────────────┘
//! ```
//!
//! - [`state`]: the lifecycle state machine (`Idle`, `Checking`, `Available`,
//!   `Downloading`, `Downloaded`, `Failed`)
//! - [`controller`]: the only owner of the state; guards every operation
//! - [`transport`]: the narrow channel between host and UI
//! - [`presenter`]: UI-side mirror and banner rendering
//! - [`feed`] / [`mock`]: update capabilities

pub mod capability;
pub mod config;
pub mod controller;
pub mod error;
pub mod feed;
pub mod mock;
pub mod presenter;
pub mod state;
pub mod transport;
pub mod types;

pub use capability::{event_channel, CapabilityEvent, EventSink, UpdateCapability};
pub use config::UpdateConfig;
pub use controller::{ControllerExit, UpdateController};
pub use error::{ErrorInfo, ErrorKind, Result, UpdateError};
pub use feed::{FeedCapability, ReleaseFeed};
pub use mock::{MockCalls, MockCapability, MockRelease};
pub use presenter::{Banner, BannerAction, MirrorState, UpdatePresenter};
pub use state::{LifecycleEvent, UpdateState};
pub use transport::{channel, HostEndpoint, Intent, Notification, UiEndpoint, UpdateBridge};
pub use types::{DownloadProgress, UpdateInfo};
