//! Read and subscribe surface for consumers.
//!
//! Reads are synchronous point-in-time snapshots taken straight from the
//! registry. Subscriptions only signal that something changed; a listener
//! re-reads what it needs. Nothing here fails: unknown rooms read as "no data
//! yet" and subscribing to an unknown room lazily creates its hub.
//!
//! [`ExternalStore`] adapts the same surface to the pull-snapshot +
//! subscribe contract used by reactive UI bindings.

use std::marker::PhantomData;
use std::rc::Rc;

use crate::engine::MirrorInner;
use crate::hub::{Channel, Subscription};
use crate::protocol::{ConnectionStatus, RoomId};
use crate::registry::RoomState;
use crate::tree::{find_node, TreeNode, UserNode};

/// All four fields of one room at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomSnapshot {
    pub status: Option<ConnectionStatus>,
    pub storage: Option<Rc<Vec<TreeNode>>>,
    pub me: Option<Rc<UserNode>>,
    /// `None` both before the first report and when nobody else is present.
    pub others: Option<Rc<Vec<UserNode>>>,
}

/// Consumer handle onto a [`Mirror`](crate::engine::Mirror).
#[derive(Clone)]
pub struct MirrorView {
    inner: Rc<MirrorInner>,
}

impl MirrorView {
    pub(crate) fn new(inner: Rc<MirrorInner>) -> Self {
        Self { inner }
    }

    pub fn current_room_id(&self) -> Option<RoomId> {
        self.inner.registry.borrow().current().map(str::to_string)
    }

    /// Known rooms in insertion order.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.inner.registry.borrow().room_ids().to_vec()
    }

    pub fn room_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Changes whenever the room list or the selection changes.
    pub fn revision(&self) -> u64 {
        self.inner.registry.borrow().revision()
    }

    /// Run `f` against a room without cloning anything.
    pub fn with_room<R>(&self, room_id: &str, f: impl FnOnce(&RoomState) -> R) -> Option<R> {
        self.inner.registry.borrow().get(room_id).map(f)
    }

    pub fn status(&self, room_id: &str) -> Option<ConnectionStatus> {
        self.with_room(room_id, |room| room.status).flatten()
    }

    pub fn storage(&self, room_id: &str) -> Option<Rc<Vec<TreeNode>>> {
        self.with_room(room_id, |room| room.storage.clone()).flatten()
    }

    pub fn me(&self, room_id: &str) -> Option<Rc<UserNode>> {
        self.with_room(room_id, |room| room.me.clone()).flatten()
    }

    /// Remote participants; an empty list reads as `None`.
    pub fn others(&self, room_id: &str) -> Option<Rc<Vec<UserNode>>> {
        self.with_room(room_id, |room| room.others_normalized().cloned()).flatten()
    }

    pub fn snapshot(&self, room_id: &str) -> RoomSnapshot {
        self.with_room(room_id, |room| RoomSnapshot {
            status: room.status,
            storage: room.storage.clone(),
            me: room.me.clone(),
            others: room.others_normalized().cloned(),
        })
        .unwrap_or_default()
    }

    /// Snapshot of the current room, if one is selected.
    pub fn current_snapshot(&self) -> Option<(RoomId, RoomSnapshot)> {
        let room_id = self.current_room_id()?;
        let snapshot = self.snapshot(&room_id);
        Some((room_id, snapshot))
    }

    /// Look a storage node up by id.
    pub fn find_storage_node(&self, room_id: &str, node_id: &str) -> Option<TreeNode> {
        self.with_room(room_id, |room| {
            room.storage
                .as_deref()
                .and_then(|storage| find_node(storage, node_id))
                .cloned()
        })
        .flatten()
    }

    /// Listen for room list and selection changes.
    pub fn subscribe_rooms(&self, listener: impl Fn() + 'static) -> Subscription {
        self.inner.rooms_signal.subscribe(listener)
    }

    /// Listen for one channel of one room.
    ///
    /// A hub created for a room the registry does not know is released
    /// again when its last subscription goes away.
    pub fn subscribe(&self, room_id: &str, channel: Channel, listener: impl Fn() + 'static) -> Subscription {
        let inner = Rc::downgrade(&self.inner);
        let room = room_id.to_string();
        self.inner
            .hub(room_id)
            .subscribe(channel, listener)
            .on_release(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.release_hub(&room);
                }
            })
    }
}

impl std::fmt::Debug for MirrorView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorView")
            .field("current", &self.current_room_id())
            .field("rooms", &self.room_count())
            .finish()
    }
}

// ───────────────────────────────────────────────────────────────────
// External-store adapters
// ───────────────────────────────────────────────────────────────────

/// Pull-snapshot + subscribe contract for reactive bindings.
///
/// `snapshot` must return equal values until a subscribed listener fires.
pub trait ExternalStore {
    type Snapshot: Clone + PartialEq;

    fn subscribe<F: Fn() + 'static>(&self, listener: F) -> Subscription;

    fn snapshot(&self) -> Self::Snapshot;
}

/// Store over the current-room pointer.
#[derive(Debug, Clone)]
pub struct CurrentRoomStore {
    view: MirrorView,
}

impl CurrentRoomStore {
    pub fn new(view: MirrorView) -> Self {
        Self { view }
    }
}

impl ExternalStore for CurrentRoomStore {
    type Snapshot = Option<RoomId>;

    fn subscribe<F: Fn() + 'static>(&self, listener: F) -> Subscription {
        self.view.subscribe_rooms(listener)
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.view.current_room_id()
    }
}

/// One readable field of a room, bound to its hub channel.
pub trait RoomField {
    const CHANNEL: Channel;
    type Value: Clone + PartialEq;

    fn read(room: &RoomState) -> Option<Self::Value>;
}

#[derive(Debug, Clone, Copy)]
pub struct StatusField;

#[derive(Debug, Clone, Copy)]
pub struct StorageField;

#[derive(Debug, Clone, Copy)]
pub struct MeField;

#[derive(Debug, Clone, Copy)]
pub struct OthersField;

impl RoomField for StatusField {
    const CHANNEL: Channel = Channel::Status;
    type Value = ConnectionStatus;

    fn read(room: &RoomState) -> Option<Self::Value> {
        room.status
    }
}

impl RoomField for StorageField {
    const CHANNEL: Channel = Channel::Storage;
    type Value = Rc<Vec<TreeNode>>;

    fn read(room: &RoomState) -> Option<Self::Value> {
        room.storage.clone()
    }
}

impl RoomField for MeField {
    const CHANNEL: Channel = Channel::Me;
    type Value = Rc<UserNode>;

    fn read(room: &RoomState) -> Option<Self::Value> {
        room.me.clone()
    }
}

impl RoomField for OthersField {
    const CHANNEL: Channel = Channel::Others;
    type Value = Rc<Vec<UserNode>>;

    fn read(room: &RoomState) -> Option<Self::Value> {
        room.others_normalized().cloned()
    }
}

/// Store over one field of one room.
#[derive(Debug, Clone)]
pub struct RoomFieldStore<F: RoomField> {
    view: MirrorView,
    room_id: RoomId,
    _field: PhantomData<F>,
}

impl<F: RoomField> RoomFieldStore<F> {
    pub fn new(view: MirrorView, room_id: impl Into<RoomId>) -> Self {
        Self {
            view,
            room_id: room_id.into(),
            _field: PhantomData,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }
}

impl<F: RoomField> ExternalStore for RoomFieldStore<F> {
    type Snapshot = Option<F::Value>;

    fn subscribe<L: Fn() + 'static>(&self, listener: L) -> Subscription {
        self.view.subscribe(&self.room_id, F::CHANNEL, listener)
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.view.with_room(&self.room_id, F::read).flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Mirror, NullSink};
    use crate::protocol::{InboundMessage, RoomSync};
    use crate::tree::{ContainerNode, JsonNode, NodeKey};
    use serde_json::json;
    use std::cell::Cell;

    fn storage() -> Vec<TreeNode> {
        vec![TreeNode::LiveObject(ContainerNode {
            id: "root".into(),
            key: "root".into(),
            payload: vec![TreeNode::Json(JsonNode { id: "leaf".into(), key: NodeKey::Index(0), payload: json!(true) })],
        })]
    }

    #[test]
    fn test_unknown_room_reads_no_data() {
        let mirror = Mirror::with_sink(NullSink);
        let view = mirror.view();

        assert_eq!(view.status("nope"), None);
        assert!(view.storage("nope").is_none());
        assert_eq!(view.snapshot("nope"), RoomSnapshot::default());
        assert!(view.current_snapshot().is_none());
    }

    #[test]
    fn test_subscribe_before_room_exists() {
        let mirror = Mirror::with_sink(NullSink);
        let view = mirror.view();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = view.subscribe("later", Channel::Storage, move || h.set(h.get() + 1));

        mirror.handle(InboundMessage::PartialSync(RoomSync::new("later").with_storage(storage())));
        assert_eq!(hits.get(), 1);
        assert_eq!(view.storage("later").map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_empty_others_reads_as_none() {
        let mirror = Mirror::with_sink(NullSink);
        mirror.handle(InboundMessage::PartialSync(RoomSync::new("r1").with_others(Vec::new())));

        let view = mirror.view();
        assert!(view.others("r1").is_none());
        assert!(view.snapshot("r1").others.is_none());
        // The raw registry still knows a report arrived.
        assert_eq!(view.with_room("r1", |room| room.others.is_some()), Some(true));
    }

    #[test]
    fn test_find_storage_node() {
        let mirror = Mirror::with_sink(NullSink);
        mirror.handle(InboundMessage::PartialSync(RoomSync::new("r1").with_storage(storage())));

        let node = mirror.view().find_storage_node("r1", "leaf").unwrap();
        assert_eq!(node.to_json(), json!(true));
        assert!(mirror.view().find_storage_node("r1", "missing").is_none());
    }

    #[test]
    fn test_field_store_snapshot_is_stable() {
        let mirror = Mirror::with_sink(NullSink);
        mirror.handle(InboundMessage::PartialSync(RoomSync::new("r1").with_storage(storage())));

        let store: RoomFieldStore<StorageField> = RoomFieldStore::new(mirror.view(), "r1");
        let first = store.snapshot().unwrap();
        mirror.handle(InboundMessage::PartialSync(RoomSync::new("r1").with_status(ConnectionStatus::Open)));
        let second = store.snapshot().unwrap();

        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_field_store_subscription_scoped_to_channel() {
        let mirror = Mirror::with_sink(NullSink);
        let store: RoomFieldStore<StatusField> = RoomFieldStore::new(mirror.view(), "r1");
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = store.subscribe(move || h.set(h.get() + 1));

        mirror.handle(InboundMessage::PartialSync(RoomSync::new("r1").with_storage(storage())));
        assert_eq!(hits.get(), 0);
        assert_eq!(store.snapshot(), None);

        mirror.handle(InboundMessage::PartialSync(RoomSync::new("r1").with_status(ConnectionStatus::Open)));
        assert_eq!(hits.get(), 1);
        assert_eq!(store.snapshot(), Some(ConnectionStatus::Open));
    }

    #[test]
    fn test_current_room_store() {
        let mirror = Mirror::with_sink(NullSink);
        let store = CurrentRoomStore::new(mirror.view());
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = store.subscribe(move || h.set(h.get() + 1));

        assert_eq!(store.snapshot(), None);
        mirror.handle(InboundMessage::available("r1"));
        assert_eq!(store.snapshot().as_deref(), Some("r1"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_others_and_me_stores() {
        let mirror = Mirror::with_sink(NullSink);
        let me = UserNode {
            id: "u1".into(),
            key: "me".into(),
            connection_id: Some(1),
            info: json!(null),
            presence: Vec::new(),
            is_read_only: true,
        };
        mirror.handle(InboundMessage::FullSync(
            RoomSync::new("r1").with_me(me.clone()).with_others(vec![me.clone()]),
        ));

        let me_store: RoomFieldStore<MeField> = RoomFieldStore::new(mirror.view(), "r1");
        let others_store: RoomFieldStore<OthersField> = RoomFieldStore::new(mirror.view(), "r1");
        assert_eq!(me_store.snapshot().as_deref(), Some(&me));
        assert_eq!(others_store.snapshot().map(|o| o.len()), Some(1));
        assert_eq!(others_store.room_id(), "r1");
    }
}
