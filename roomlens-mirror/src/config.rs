//! Mirror configuration.

use serde::Deserialize;

/// How a `room::sync::full` message is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullSyncMode {
    /// Field-by-field merge, identical to a partial sync.
    #[default]
    Merge,
    /// Overwrite all four fields; omitted fields are cleared.
    Replace,
}

/// Lifetime of a room's event hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubLifecycle {
    /// Hub is dropped when its room is removed from the registry.
    #[default]
    BoundToRoom,
    /// Hub lives until the mirror is dropped, even after room removal.
    Lazy,
}

/// Mirror configuration.
///
/// Every field has a default, so a host may load a partial JSON document:
/// ```text
/// { "full_sync": "replace", "strict_protocol": false }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub full_sync: FullSyncMode,
    pub hub_lifecycle: HubLifecycle,
    /// Treat unrecognized inbound messages as a defect (debug assertion).
    pub strict_protocol: bool,
    /// `source` tag expected on inbound frames.
    pub client_source: String,
    /// `source` tag stamped on outbound frames.
    pub panel_source: String,
    /// Buffered inbound messages in the dispatch queue.
    pub dispatch_capacity: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            full_sync: FullSyncMode::Merge,
            hub_lifecycle: HubLifecycle::BoundToRoom,
            strict_protocol: cfg!(debug_assertions),
            client_source: "devtools-client".to_string(),
            panel_source: "devtools-panel".to_string(),
            dispatch_capacity: 256,
        }
    }
}

impl MirrorConfig {
    /// Parse a (possibly partial) JSON configuration document.
    pub fn from_json(text: &str) -> crate::error::MirrorResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
