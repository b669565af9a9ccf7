//! Control messages exchanged between the foreground page and the worker.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// Messages the page sends to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Ask for the worker's generation tag.
    GetVersion,
    /// Liveness probe.
    Ping,
    /// Force the waiting worker active. Fire-and-forget, no reply.
    SkipWaiting,
}

impl ClientMessage {
    /// Wire form.
    pub fn to_json(self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Replies the worker sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReply {
    /// Reply to `GET_VERSION`.
    Version { version: String },
    /// Reply to `PING`.
    Pong { version: String },
}

impl WorkerReply {
    /// Wire form. `GET_VERSION` answers with a bare version object; `PONG`
    /// carries its own type tag.
    pub fn to_json(&self) -> JsonValue {
        match self {
            WorkerReply::Version { version } => json!({ "version": version }),
            WorkerReply::Pong { version } => json!({ "type": "PONG", "version": version }),
        }
    }
}
