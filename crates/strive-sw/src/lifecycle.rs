//! Worker lifecycle: install, activate, forced activation, messages.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace, warn};

use crate::config::SwConfig;
use crate::messages::{ClientMessage, WorkerReply};
use crate::SwError;
use strive_cache::{prune_stale, store_if_cacheable, SharedStorage};
use strive_net::{Fetch, Request, Response};

/// Delay before a SKIP_WAITING instruction forces activation. Absorbs
/// rapid repeated instructions into one transition.
const SKIP_WAITING_DELAY: Duration = Duration::from_millis(40);

/// Worker lifecycle state. Transitions are driven by the host platform
/// except the explicit forced activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Script loaded, install not yet started.
    Parsed,
    /// Install event running.
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Activate event running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced, or install failed.
    Redundant,
}

/// Events the worker raises toward the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwEvent {
    /// State transition completed.
    StateChange { state: WorkerState },
    /// A worker finished installing and is waiting.
    WorkerInstalled { version: String },
    /// A new worker took control; pages observe this as controller-change.
    ControllerChange,
}

/// Worker-side lifecycle controller. Owns the install/activate phases and
/// the control-message dispatch for one registration. Cloning shares the
/// same underlying state.
#[derive(Clone)]
pub struct LifecycleController {
    config: Arc<SwConfig>,
    fetcher: Arc<dyn Fetch>,
    storage: SharedStorage,
    state: Arc<RwLock<WorkerState>>,
    events: mpsc::UnboundedSender<SwEvent>,
}

impl LifecycleController {
    /// Create a controller and the event stream the foreground listens on.
    pub fn new(
        config: SwConfig,
        fetcher: Arc<dyn Fetch>,
        storage: SharedStorage,
    ) -> (Self, mpsc::UnboundedReceiver<SwEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                config: Arc::new(config),
                fetcher,
                storage,
                state: Arc::new(RwLock::new(WorkerState::Parsed)),
                events,
            },
            event_rx,
        )
    }

    /// Current state.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// The generation tag this worker serves.
    pub fn version(&self) -> &str {
        &self.config.generation
    }

    /// Install phase: fetch the whole pre-cache manifest, all-or-nothing.
    /// Any failure (including non-2xx) aborts without leaving a partial
    /// static bucket behind; the platform retries later.
    pub async fn install(&self) -> Result<(), SwError> {
        self.set_state(WorkerState::Installing).await;

        let mut entries: Vec<(Request, Response)> = Vec::new();
        for path in &self.config.precache_manifest {
            let url = self
                .config
                .origin
                .join(path)
                .map_err(|e| SwError::InstallFailed(format!("{path}: {e}")))?;
            let request = Request::get(url);
            let response = match self.fetcher.fetch(&request).await {
                Ok(response) if response.ok() => response,
                Ok(response) => {
                    self.set_state(WorkerState::Redundant).await;
                    return Err(SwError::InstallFailed(format!(
                        "{path}: status {}",
                        response.status
                    )));
                }
                Err(err) => {
                    self.set_state(WorkerState::Redundant).await;
                    return Err(SwError::InstallFailed(format!("{path}: {err}")));
                }
            };
            entries.push((request, response));
        }

        let names = self.config.bucket_names();
        {
            let mut storage = self.storage.write().await;
            let bucket = storage.open(&names.static_name);
            for (request, response) in &entries {
                store_if_cacheable(bucket, request, response)?;
            }
        }
        info!(
            bucket = %names.static_name,
            entries = entries.len(),
            "Pre-cache install complete"
        );

        self.set_state(WorkerState::Installed).await;
        let _ = self.events.send(SwEvent::WorkerInstalled {
            version: self.config.generation.clone(),
        });
        Ok(())
    }

    /// Activate phase: ensure the current buckets exist, delete every
    /// other generation. Storage is bounded to exactly two buckets.
    pub async fn activate(&self) -> Result<(), SwError> {
        if matches!(
            self.state().await,
            WorkerState::Activating | WorkerState::Activated
        ) {
            return Ok(());
        }
        self.set_state(WorkerState::Activating).await;

        let names = self.config.bucket_names();
        {
            let mut storage = self.storage.write().await;
            storage.open(&names.static_name);
            storage.open(&names.dynamic_name);
            let deleted = prune_stale(&mut storage, &names);
            if !deleted.is_empty() {
                debug!(deleted = deleted.len(), "Stale buckets pruned at activate");
            }
        }

        self.set_state(WorkerState::Activated).await;
        let _ = self.events.send(SwEvent::ControllerChange);
        Ok(())
    }

    /// Forced activation, delayed so rapid repeated instructions collapse
    /// into one transition. Fire-and-forget.
    pub async fn skip_waiting(&self) {
        tokio::time::sleep(SKIP_WAITING_DELAY).await;
        if matches!(
            self.state().await,
            WorkerState::Activating | WorkerState::Activated
        ) {
            return;
        }
        if let Err(err) = self.activate().await {
            warn!(error = %err, "Forced activation failed");
        }
    }

    /// Control-message dispatch. Unknown or malformed messages are a
    /// silent no-op.
    pub fn on_message(&self, value: JsonValue) -> Option<WorkerReply> {
        let message: ClientMessage = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(_) => {
                trace!("Ignoring unrecognized control message");
                return None;
            }
        };

        match message {
            ClientMessage::GetVersion => Some(WorkerReply::Version {
                version: self.config.generation.clone(),
            }),
            ClientMessage::Ping => Some(WorkerReply::Pong {
                version: self.config.generation.clone(),
            }),
            ClientMessage::SkipWaiting => {
                let controller = self.clone();
                tokio::spawn(async move {
                    controller.skip_waiting().await;
                });
                None
            }
        }
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
        debug!(state = ?state, "Worker state change");
        let _ = self.events.send(SwEvent::StateChange { state });
    }
}
