//! # Strive SW
//!
//! Worker side of the Strive offline shell: request interception, the
//! three cache strategies, and the install/activate/message lifecycle.
//!
//! ## Features
//!
//! - **Classification**: bypass / static asset / API / navigation routing
//! - **Strategies**: Cache-First, Network-First, Stale-While-Revalidate
//! - **Lifecycle**: all-or-nothing pre-cache install, activate-phase
//!   bucket pruning, delayed forced activation
//! - **Messages**: `GET_VERSION`, `PING`/`PONG`, `SKIP_WAITING`;
//!   unknown types are a silent no-op
//!
//! ## Architecture
//!
//! ```text
//! FetchGateway ── classify ──► CacheFirst ──────► static bucket
//!     │                        NetworkFirst ────► dynamic bucket
//!     │                        StaleWhileRevalidate
//!     │                                │ (detached refresh)
//!     └── dyn Fetch ◄─────────────────┘
//!
//! LifecycleController: Installing → Installed → Activating → Activated
//!                       (SKIP_WAITING forces the last hop)
//! ```

use thiserror::Error;

pub mod classify;
pub mod config;
pub mod lifecycle;
pub mod messages;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testutil;

pub use classify::{classify, RouteClass, StrategyKind};
pub use config::SwConfig;
pub use lifecycle::{LifecycleController, SwEvent, WorkerState};
pub use messages::{ClientMessage, WorkerReply};
pub use strategy::FetchGateway;

/// Errors that can occur on the worker side.
#[derive(Error, Debug)]
pub enum SwError {
    /// A pre-cache fetch failed; the whole install phase aborts.
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Cache error: {0}")]
    Cache(#[from] strive_cache::CacheError),

    #[error("Network error: {0}")]
    Net(#[from] strive_net::NetError),

    #[error("State error: {0}")]
    State(String),
}
