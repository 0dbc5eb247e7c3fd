//! # roomlens-mirror — Devtools-side mirror of live collaboration rooms
//!
//! Keeps a read-only copy of every room an instrumented client announces,
//! tracks which room the panel is looking at, and tells consumers when a
//! slice of that state changes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   JSON frames    ┌──────────────────────────────┐
//! │ instrumented │ ───────────────► │ Mirror                       │
//! │ client       │                  │   reduce ──► RoomRegistry    │
//! │              │ ◄─────────────── │   Effects ──► EventHubs      │
//! └──────────────┘  connect / sub   └──────────────┬───────────────┘
//!                                                   │ MirrorView
//!                                                   ▼
//!                                   ┌──────────────────────────────┐
//!                                   │ panel UI (snapshots, signals)│
//!                                   └──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`tree`] — Storage and presence tree nodes
//! - [`protocol`] — JSON wire messages in both directions
//! - [`hub`] — Per-room, per-channel listener fan-out
//! - [`registry`] — Known rooms and the current-room pointer
//! - [`reducer`] — Pure message → registry transition
//! - [`engine`] — The `Mirror` context tying it together
//! - [`facade`] — Snapshot reads, subscriptions, external-store adapters
//! - [`dispatch`] — Serializing queue for multi-task hosts

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod facade;
pub mod hub;
pub mod protocol;
pub mod reducer;
pub mod registry;
pub mod tree;

// Re-exports for convenience
pub use config::{FullSyncMode, HubLifecycle, MirrorConfig};
pub use dispatch::{dispatch_queue, Dispatch, DispatchHandle, DispatchQueue};
pub use engine::{FrameSink, Mirror, NullSink, OutboundSink};
pub use error::{MirrorError, MirrorResult};
pub use facade::{
    CurrentRoomStore, ExternalStore, MeField, MirrorView, OthersField, RoomField, RoomFieldStore,
    RoomSnapshot, StatusField, StorageField,
};
pub use hub::{Channel, EventHub, Signal, Subscription};
pub use protocol::{
    decode_inbound, ConnectionStatus, InboundMessage, OutboundMessage, RoomId, RoomSync, SyncKind,
};
pub use reducer::{reduce, Effects, SelectionChange};
pub use registry::{RoomRegistry, RoomState};
pub use tree::{
    count_nodes, find_node, to_json_object, ContainerNode, JsonNode, NodeKey, NodeKind, TreeNode,
    UserNode,
};
