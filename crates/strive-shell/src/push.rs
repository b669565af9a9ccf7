//! Push display contract: payload defaults and the focus-or-open click
//! rule. Provider wiring stays outside this crate.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use url::Url;

use crate::ShellError;

/// Unique identifier for a window client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Incoming push payload. Every field falls back to a fixed default when
/// the provider omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_body")]
    pub body: String,

    #[serde(default = "default_icon")]
    pub icon: String,

    #[serde(default = "default_badge")]
    pub badge: String,

    #[serde(default = "default_url")]
    pub url: String,
}

fn default_title() -> String {
    "Strive".to_string()
}

fn default_body() -> String {
    "Open Strive to see what's new.".to_string()
}

fn default_icon() -> String {
    "/icons/icon-192.png".to_string()
}

fn default_badge() -> String {
    "/icons/badge-72.png".to_string()
}

fn default_url() -> String {
    "/dashboard".to_string()
}

impl Default for PushPayload {
    fn default() -> Self {
        Self {
            title: default_title(),
            body: default_body(),
            icon: default_icon(),
            badge: default_badge(),
            url: default_url(),
        }
    }
}

impl PushPayload {
    /// Parse a provider payload; anything unusable becomes the defaults.
    pub fn parse(value: &JsonValue) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Resolve into the displayable notification.
    pub fn to_notification(&self) -> Notification {
        Notification {
            title: self.title.clone(),
            body: self.body.clone(),
            icon: self.icon.clone(),
            badge: self.badge.clone(),
            url: self.url.clone(),
        }
    }
}

/// What the platform displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub url: String,
}

/// An open window the shell can focus or navigate.
#[derive(Debug, Clone)]
pub struct WindowClient {
    pub id: ClientId,
    pub url: Url,
    pub focused: bool,
}

/// Outcome of a notification click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An existing same-origin window was focused and navigated.
    Focused(ClientId),
    /// No same-origin window existed; a new one was opened.
    Opened(ClientId),
}

/// Registry of open windows.
#[derive(Debug, Default)]
pub struct Clients {
    windows: HashMap<ClientId, WindowClient>,
}

impl Clients {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a window.
    pub fn add(&mut self, url: Url, focused: bool) -> ClientId {
        let id = ClientId::new();
        self.windows.insert(id, WindowClient { id, url, focused });
        id
    }

    /// Get a window by id.
    pub fn get(&self, id: ClientId) -> Option<&WindowClient> {
        self.windows.get(&id)
    }

    /// Stop tracking a window.
    pub fn remove(&mut self, id: ClientId) -> Option<WindowClient> {
        self.windows.remove(&id)
    }

    /// Open a new focused window.
    pub fn open_window(&mut self, url: Url) -> ClientId {
        debug!(url = %url, "Opening window");
        self.add(url, true)
    }

    /// Notification click: focus the first same-origin window, navigating
    /// it to the payload URL, or open a new one.
    pub fn handle_click(
        &mut self,
        origin: &Url,
        payload: &PushPayload,
    ) -> Result<ClickOutcome, ShellError> {
        let target = origin.join(&payload.url)?;

        let existing = self
            .windows
            .values_mut()
            .find(|window| window.url.origin() == origin.origin());
        if let Some(window) = existing {
            window.focused = true;
            window.url = target;
            return Ok(ClickOutcome::Focused(window.id));
        }

        Ok(ClickOutcome::Opened(self.open_window(target)))
    }
}
