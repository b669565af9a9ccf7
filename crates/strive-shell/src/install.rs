//! Install offer eligibility: native prompt capture, 30-day frequency
//! cap per identity, once per page load.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::prefs::PrefStore;

/// Frequency cap between install offers for one identity.
pub const OFFER_INTERVAL_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Fixed post-load delay before the offer may surface.
pub const OFFER_DELAY: Duration = Duration::from_secs(10);

/// The user's answer to the native install prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallChoice {
    Accepted,
    Dismissed,
}

/// Gates the user-facing install offer. The cap is keyed to the local
/// preference store, so it is per device/profile rather than truly
/// per identity across devices.
pub struct InstallGate {
    prefs: Arc<dyn PrefStore>,
    prompt_captured: bool,
    standalone: bool,
    offered_this_load: bool,
}

impl InstallGate {
    /// Create a gate. `standalone` is whether the app is already running
    /// installed.
    pub fn new(prefs: Arc<dyn PrefStore>, standalone: bool) -> Self {
        Self {
            prefs,
            prompt_captured: false,
            standalone,
            offered_this_load: false,
        }
    }

    /// The native install-offer event fired; its default behavior was
    /// suppressed and the prompt is held for later invocation.
    pub fn capture_prompt(&mut self) {
        self.prompt_captured = true;
    }

    /// Whether a captured prompt is still held.
    pub fn prompt_captured(&self) -> bool {
        self.prompt_captured
    }

    /// Whether the offer may be shown to this identity right now.
    pub fn should_offer(&self, identity: &str, now_ms: u64) -> bool {
        if !self.prompt_captured || self.standalone || self.offered_this_load {
            return false;
        }
        match self.last_offer_ms(identity) {
            None => true,
            Some(stamp) => now_ms.saturating_sub(stamp) >= OFFER_INTERVAL_MS,
        }
    }

    /// Surface the offer if eligible; at most once per page load.
    pub fn offer(&mut self, identity: &str, now_ms: u64) -> bool {
        if !self.should_offer(identity, now_ms) {
            return false;
        }
        self.offered_this_load = true;
        true
    }

    /// Wait out the fixed post-load delay, then surface the offer if the
    /// identity is still eligible.
    pub async fn offer_after_delay(&mut self, identity: &str) -> bool {
        tokio::time::sleep(OFFER_DELAY).await;
        self.offer(identity, now_ms())
    }

    /// The user accepted the offer: invoke the captured native prompt and
    /// settle on the platform's reported choice. The prompt is single-use
    /// and the 30-day window restarts either way.
    pub fn accept(&mut self, identity: &str, now_ms: u64, choice: InstallChoice) -> InstallChoice {
        self.stamp(identity, now_ms);
        self.prompt_captured = false;
        debug!(identity, choice = ?choice, "Install prompt settled");
        choice
    }

    /// The user ignored or closed the offer without invoking the native
    /// prompt. The window restarts; the captured prompt is retained.
    pub fn defer(&mut self, identity: &str, now_ms: u64) {
        self.stamp(identity, now_ms);
    }

    fn last_offer_ms(&self, identity: &str) -> Option<u64> {
        self.prefs
            .get(&record_key(identity))
            .and_then(|raw| raw.parse().ok())
    }

    fn stamp(&self, identity: &str, now_ms: u64) {
        self.prefs.put(&record_key(identity), &now_ms.to_string());
    }
}

fn record_key(identity: &str) -> String {
    format!("install-offer/{identity}")
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
