//! Message alphabet exchanged with the instrumented client.
//!
//! Wire format (JSON text, one message per frame):
//! ```text
//! ┌──────────┬───────────────────────┬──────────┬─────────────────────────────┐
//! │ source   │ msg                   │ roomId   │ fields                      │
//! ├──────────┼───────────────────────┼──────────┼─────────────────────────────┤
//! │ client   │ wake-up-devtools      │ —        │ —                           │
//! │ client   │ room::available       │ required │ —                           │
//! │ client   │ room::unavailable     │ required │ —                           │
//! │ client   │ room::sync::full      │ required │ status? storage? me? others?│
//! │ client   │ room::sync::partial   │ required │ status? storage? me? others?│
//! │ panel    │ connect               │ —        │ —                           │
//! │ panel    │ room::subscribe       │ required │ —                           │
//! │ panel    │ room::unsubscribe     │ required │ —                           │
//! └──────────┴───────────────────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! An omitted field means "no new information", never "clear".

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MirrorError;
use crate::tree::{TreeNode, UserNode};

/// Opaque room identifier, unique within a registry.
pub type RoomId = String;

const INBOUND_TAGS: [&str; 5] = [
    "wake-up-devtools",
    "room::available",
    "room::unavailable",
    "room::sync::full",
    "room::sync::partial",
];

/// Connection lifecycle reported by the client for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionStatus {
    Closed,
    Authenticating,
    Connecting,
    Open,
    Unavailable,
    Failed,
    /// Any status string this build does not know about.
    Unknown,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Authenticating => "authenticating",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Unavailable => "unavailable",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for ConnectionStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "closed" => Self::Closed,
            "authenticating" => Self::Authenticating,
            "connecting" => Self::Connecting,
            "open" => Self::Open,
            "unavailable" => Self::Unavailable,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl From<ConnectionStatus> for String {
    fn from(status: ConnectionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which sync message carried the fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Full,
    Partial,
}

/// Field payload of a `room::sync::*` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSync {
    pub room_id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConnectionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Vec<TreeNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<UserNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub others: Option<Vec<UserNode>>,
}

impl RoomSync {
    pub fn new(room_id: impl Into<RoomId>) -> Self {
        Self {
            room_id: room_id.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ConnectionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_storage(mut self, storage: Vec<TreeNode>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_me(mut self, me: UserNode) -> Self {
        self.me = Some(me);
        self
    }

    pub fn with_others(mut self, others: Vec<UserNode>) -> Self {
        self.others = Some(others);
        self
    }

    /// Whether the message carries no field at all.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.storage.is_none() && self.me.is_none() && self.others.is_none()
    }
}

/// Messages sent by the instrumented client to the panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg")]
pub enum InboundMessage {
    /// Client announces itself; the panel answers with `connect`.
    #[serde(rename = "wake-up-devtools")]
    WakeUp,
    #[serde(rename = "room::available", rename_all = "camelCase")]
    RoomAvailable { room_id: RoomId },
    #[serde(rename = "room::unavailable", rename_all = "camelCase")]
    RoomUnavailable { room_id: RoomId },
    #[serde(rename = "room::sync::full")]
    FullSync(RoomSync),
    #[serde(rename = "room::sync::partial")]
    PartialSync(RoomSync),
}

impl InboundMessage {
    pub fn available(room_id: impl Into<RoomId>) -> Self {
        Self::RoomAvailable { room_id: room_id.into() }
    }

    pub fn unavailable(room_id: impl Into<RoomId>) -> Self {
        Self::RoomUnavailable { room_id: room_id.into() }
    }

    /// Room the message refers to, if any.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::WakeUp => None,
            Self::RoomAvailable { room_id } | Self::RoomUnavailable { room_id } => Some(room_id.as_str()),
            Self::FullSync(sync) | Self::PartialSync(sync) => Some(sync.room_id.as_str()),
        }
    }

    /// Wire tag of this message.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::WakeUp => INBOUND_TAGS[0],
            Self::RoomAvailable { .. } => INBOUND_TAGS[1],
            Self::RoomUnavailable { .. } => INBOUND_TAGS[2],
            Self::FullSync(_) => INBOUND_TAGS[3],
            Self::PartialSync(_) => INBOUND_TAGS[4],
        }
    }

    /// Encode with the given source tag (used by test producers and tools).
    pub fn encode(&self, source: &str) -> Result<String, MirrorError> {
        encode_with_source(self, source)
    }
}

/// Control messages sent by the panel to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg")]
pub enum OutboundMessage {
    /// Attach to the client after a wake-up.
    #[serde(rename = "connect")]
    Connect,
    /// Start streaming updates for a room.
    #[serde(rename = "room::subscribe", rename_all = "camelCase")]
    Subscribe { room_id: RoomId },
    /// Stop streaming updates for a room.
    #[serde(rename = "room::unsubscribe", rename_all = "camelCase")]
    Unsubscribe { room_id: RoomId },
}

impl OutboundMessage {
    pub fn subscribe(room_id: impl Into<RoomId>) -> Self {
        Self::Subscribe { room_id: room_id.into() }
    }

    pub fn unsubscribe(room_id: impl Into<RoomId>) -> Self {
        Self::Unsubscribe { room_id: room_id.into() }
    }

    /// Serialize to wire JSON with the panel's source tag.
    pub fn encode(&self, source: &str) -> Result<String, MirrorError> {
        encode_with_source(self, source)
    }

    /// Parse a panel message (used by client-side tools and tests).
    pub fn decode(text: &str) -> Result<Self, MirrorError> {
        Ok(serde_json::from_str(text)?)
    }
}

fn encode_with_source<T: Serialize>(msg: &T, source: &str) -> Result<String, MirrorError> {
    let mut value = serde_json::to_value(msg)?;
    if let Value::Object(map) = &mut value {
        map.insert("source".to_string(), Value::String(source.to_string()));
    }
    Ok(serde_json::to_string(&value)?)
}

/// Decode one inbound frame.
///
/// Returns `Ok(None)` for frames whose `source` is not `expected_source`:
/// the channel is shared with unrelated traffic, which is not a violation.
/// Frames from the expected source with an unknown `msg` tag fail with
/// [`MirrorError::UnknownMessage`].
pub fn decode_inbound(text: &str, expected_source: &str) -> Result<Option<InboundMessage>, MirrorError> {
    let value: Value = serde_json::from_str(text)?;

    let source = value.get("source").and_then(Value::as_str);
    if source != Some(expected_source) {
        return Ok(None);
    }

    let tag = value
        .get("msg")
        .and_then(Value::as_str)
        .ok_or(MirrorError::MissingField { field: "msg" })?;
    if !INBOUND_TAGS.contains(&tag) {
        return Err(MirrorError::UnknownMessage(tag.to_string()));
    }

    Ok(Some(serde_json::from_value(value)?))
}
