//! Update detection and the apply/reload flow.
//!
//! All mutable lifecycle state lives on one `UpdateFlow` instance with
//! named transitions and a single dispatch point; nothing is read from
//! ambient globals.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::prefs::PrefStore;
use strive_sw::ClientMessage;

/// How long a dismissal mutes the update prompt.
pub const DISMISS_COOLDOWN: Duration = Duration::from_secs(30 * 60);

const VISITED_KEY: &str = "visited";

/// Opaque handle to a worker, enough to address it over the message
/// channel and compare identities.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    /// Registration-scoped worker identity.
    pub id: u64,

    /// Generation tag, when the worker reported one.
    pub version: Option<String>,

    tx: mpsc::UnboundedSender<JsonValue>,
}

impl WorkerHandle {
    /// Create a handle addressing a worker over the given channel.
    pub fn new(id: u64, version: Option<String>, tx: mpsc::UnboundedSender<JsonValue>) -> Self {
        Self { id, version, tx }
    }

    /// Instruct the worker to force itself active.
    pub fn send_skip_waiting(&self) -> bool {
        self.tx.send(ClientMessage::SkipWaiting.to_json()).is_ok()
    }
}

/// What the page knew the moment it loaded. A fresh uncontrolled load
/// cannot be "updating", so this is captured exactly once.
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    /// Whether a controller was already serving this page at load.
    pub had_controller: bool,

    /// Identity of that controller, if any.
    pub controller_id: Option<u64>,

    /// The controller's generation tag, if known.
    pub controller_version: Option<String>,

    /// Persisted flag: this is not the first-ever visit.
    pub visited_before: bool,
}

impl LoadContext {
    /// Capture the load context and stamp the visited flag for the next
    /// load. The returned context still reflects the pre-stamp value.
    pub fn capture(prefs: &dyn PrefStore, controller: Option<&WorkerHandle>) -> Self {
        let visited_before = prefs.get(VISITED_KEY).as_deref() == Some("true");
        prefs.put(VISITED_KEY, "true");
        Self {
            had_controller: controller.is_some(),
            controller_id: controller.map(|c| c.id),
            controller_version: controller.and_then(|c| c.version.clone()),
            visited_before,
        }
    }
}

/// Fires the page reload when an applied update takes control.
pub trait Reloader: Send + Sync {
    /// Reload the page.
    fn reload(&self);
}

/// Update flow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    /// No update known.
    Idle,
    /// A waiting worker was confirmed as an update; the prompt is up.
    Available,
    /// The user applied; waiting for the new worker to take control.
    Applying,
    /// The one-time reload fired.
    Reloaded,
    /// The prompt was dismissed; muted until the cool-down passes.
    Dismissed,
}

/// Events routed through the single dispatch point.
#[derive(Debug)]
pub enum FlowEvent {
    /// A distinct worker reached "installed".
    WorkerInstalled(WorkerHandle),
    /// The page's controller changed.
    ControllerChange,
    /// The user dismissed the prompt.
    DismissRequested,
    /// The user asked to apply the update.
    ApplyRequested,
    /// Periodic re-evaluation (cool-down expiry).
    Tick,
}

/// Owns every mutable datum of the update lifecycle for one page:
/// availability, the waiting handle, the dismissal deadline, and the
/// one-shot reload arm.
pub struct UpdateFlow {
    context: LoadContext,
    state: UpdateState,
    waiting: Option<WorkerHandle>,
    dismissed_until: Option<Instant>,
    reload_armed: bool,
    reloader: Arc<dyn Reloader>,
}

impl UpdateFlow {
    /// Create a flow for one page load.
    pub fn new(context: LoadContext, reloader: Arc<dyn Reloader>) -> Self {
        Self {
            context,
            state: UpdateState::Idle,
            waiting: None,
            dismissed_until: None,
            reload_armed: false,
            reloader,
        }
    }

    /// Current state.
    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Whether the update prompt should be showing.
    pub fn update_available(&self) -> bool {
        self.state == UpdateState::Available
    }

    /// Single dispatch point: every lifecycle event funnels through here.
    pub fn dispatch(&mut self, event: FlowEvent, now: Instant) {
        match event {
            FlowEvent::WorkerInstalled(handle) => {
                self.worker_installed(handle, now);
            }
            FlowEvent::ControllerChange => self.on_controller_change(),
            FlowEvent::DismissRequested => self.dismiss(now),
            FlowEvent::ApplyRequested => {
                self.apply();
            }
            FlowEvent::Tick => self.tick(now),
        }
    }

    /// An "installed" worker is an update only when the page was already
    /// controlled this load, the worker differs from that controller, and
    /// the persisted visited flag rules out a first-ever visit. Known,
    /// equal version tags on both sides veto the signal. Returns whether
    /// the prompt was raised.
    pub fn worker_installed(&mut self, handle: WorkerHandle, now: Instant) -> bool {
        if !self.context.had_controller || !self.context.visited_before {
            debug!(
                had_controller = self.context.had_controller,
                visited_before = self.context.visited_before,
                "Treating installed worker as first install"
            );
            return false;
        }
        if self.context.controller_id == Some(handle.id) {
            return false;
        }
        if let (Some(current), Some(candidate)) =
            (&self.context.controller_version, &handle.version)
        {
            if current == candidate {
                debug!(version = %candidate, "Installed worker matches controller version");
                return false;
            }
        }
        if matches!(self.state, UpdateState::Applying | UpdateState::Reloaded) {
            return false;
        }

        if let Some(until) = self.dismissed_until {
            if now < until {
                // Still muted; retain the handle for the re-raise.
                self.waiting = Some(handle);
                return false;
            }
        }

        self.waiting = Some(handle);
        self.state = UpdateState::Available;
        true
    }

    /// Mute the prompt for the cool-down window. The handle is retained
    /// so the prompt can re-raise afterward.
    pub fn dismiss(&mut self, now: Instant) {
        if self.state == UpdateState::Available {
            self.state = UpdateState::Dismissed;
            self.dismissed_until = Some(now + DISMISS_COOLDOWN);
        }
    }

    /// Re-raise after an expired cool-down if the worker is still waiting.
    pub fn tick(&mut self, now: Instant) {
        if self.state != UpdateState::Dismissed {
            return;
        }
        let expired = self.dismissed_until.map(|until| now >= until).unwrap_or(true);
        if expired && self.waiting.is_some() {
            self.dismissed_until = None;
            self.state = UpdateState::Available;
        }
    }

    /// Apply the update. The flag and handle are cleared before anything
    /// else so a second invocation is a no-op, then the one-shot reload
    /// is armed and SKIP_WAITING goes out. Returns whether an apply was
    /// initiated.
    pub fn apply(&mut self) -> bool {
        let handle = match self.waiting.take() {
            Some(handle) => handle,
            None => return false,
        };
        self.state = UpdateState::Applying;
        self.reload_armed = true;
        if !handle.send_skip_waiting() {
            warn!("Waiting worker is gone; reload will not fire");
        }
        true
    }

    /// Controller-change listener. Armed exactly once per apply; the arm
    /// detaches before the reload fires.
    pub fn on_controller_change(&mut self) {
        if !self.reload_armed {
            return;
        }
        self.reload_armed = false;
        self.state = UpdateState::Reloaded;
        self.reloader.reload();
    }
}
