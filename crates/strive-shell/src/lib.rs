//! # Strive Shell
//!
//! Foreground side of the Strive offline shell: update detection and the
//! apply/reload flow, install offer gating, and the push display contract.
//!
//! ## Features
//!
//! - **Update flow**: distinguishes first install from a genuine update,
//!   coordinates a one-time reload with a 30-minute dismissal cool-down
//! - **Install gate**: frequency-caps the install offer at 30 days per
//!   identity, 10-second post-load delay, once per page load
//! - **Push display**: payload defaults and the focus-or-open click rule
//!
//! ## Architecture
//!
//! ```text
//! worker events ──► UpdateFlow (Idle → Available → Applying → Reloaded)
//!                       │                    ▲
//!                       │ SKIP_WAITING       │ controller-change
//!                       ▼                    │
//!                   WorkerHandle ──► LifecycleController
//! ```

use thiserror::Error;

pub mod install;
pub mod prefs;
pub mod push;
pub mod update;

pub use install::{InstallChoice, InstallGate, OFFER_DELAY, OFFER_INTERVAL_MS};
pub use prefs::{FilePrefs, MemoryPrefs, PrefStore};
pub use push::{ClickOutcome, ClientId, Clients, Notification, PushPayload, WindowClient};
pub use update::{
    FlowEvent, LoadContext, Reloader, UpdateFlow, UpdateState, WorkerHandle, DISMISS_COOLDOWN,
};

/// Errors that can occur on the foreground side.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Preference store error: {0}")]
    Prefs(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}
