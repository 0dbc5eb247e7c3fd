//! Inbound message → registry transition.
//!
//! ```text
//! InboundMessage ──► reduce(&mut RoomRegistry) ──► Effects
//!                                                   ├── rooms_changed  (room-list signal)
//!                                                   ├── notify         (hub channels)
//!                                                   ├── outbound       (connect / subscribe / unsubscribe)
//!                                                   └── removed        (hubs to tear down)
//! ```
//!
//! The reducer only touches the registry. Hubs and the outbound channel are
//! driven by the engine from the returned [`Effects`], so every transition can
//! be tested without listeners.

use std::rc::Rc;

use crate::config::FullSyncMode;
use crate::hub::Channel;
use crate::protocol::{ConnectionStatus, InboundMessage, OutboundMessage, RoomId, RoomSync, SyncKind};
use crate::registry::{RoomRegistry, RoomState};
use crate::tree::{TreeNode, UserNode};

/// Net change of the current-room pointer over one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub previous: Option<RoomId>,
    pub current: Option<RoomId>,
}

impl SelectionChange {
    /// Unsubscribe from the previous room, then subscribe to the new one.
    pub fn messages(&self) -> Vec<OutboundMessage> {
        let mut out = Vec::with_capacity(2);
        if let Some(previous) = &self.previous {
            out.push(OutboundMessage::unsubscribe(previous.clone()));
        }
        if let Some(current) = &self.current {
            out.push(OutboundMessage::subscribe(current.clone()));
        }
        out
    }
}

/// Side effects of one transition, applied by the engine in order.
#[derive(Debug, Default, PartialEq)]
pub struct Effects {
    /// Room id set or current pointer changed.
    pub rooms_changed: bool,
    pub selection: Option<SelectionChange>,
    /// Hub channels to notify, in notification order.
    pub notify: Vec<(RoomId, Channel)>,
    pub outbound: Vec<OutboundMessage>,
    /// Rooms dropped from the registry by this transition.
    pub removed: Vec<RoomId>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        !self.rooms_changed
            && self.selection.is_none()
            && self.notify.is_empty()
            && self.outbound.is_empty()
            && self.removed.is_empty()
    }
}

/// Apply one inbound message to the registry.
pub fn reduce(registry: &mut RoomRegistry, msg: InboundMessage, full_sync: FullSyncMode) -> Effects {
    let mut effects = Effects::default();
    let revision = registry.revision();
    let previous = registry.current().map(str::to_string);

    match msg {
        InboundMessage::WakeUp => {
            effects.outbound.push(OutboundMessage::Connect);
        }

        InboundMessage::RoomAvailable { room_id } => {
            registry.get_or_create(&room_id);
            registry.soft_set_current(Some(&room_id));
        }

        InboundMessage::RoomUnavailable { room_id } => {
            if registry.remove(&room_id) {
                effects.removed.push(room_id);
            } else {
                log::debug!("Unavailable for unknown room {room_id}; ignoring");
            }
            registry.soft_set_current(None);
        }

        InboundMessage::FullSync(sync) => apply_sync(registry, sync, SyncKind::Full, full_sync, &mut effects),
        InboundMessage::PartialSync(sync) => apply_sync(registry, sync, SyncKind::Partial, full_sync, &mut effects),
    }

    effects.rooms_changed = registry.revision() != revision;

    let current = registry.current().map(str::to_string);
    if current != previous {
        let change = SelectionChange { previous, current };
        log::info!("Current room {:?} → {:?}", change.previous, change.current);
        effects.outbound.extend(change.messages());
        effects.selection = Some(change);
    }

    effects
}

fn apply_sync(
    registry: &mut RoomRegistry,
    sync: RoomSync,
    kind: SyncKind,
    mode: FullSyncMode,
    effects: &mut Effects,
) {
    let RoomSync { room_id, status, storage, me, others } = sync;
    let replace = kind == SyncKind::Full && mode == FullSyncMode::Replace;

    let (room, _) = registry.get_or_create(&room_id);
    let changed = merge_room(room, status, storage, me, others, replace);
    log::debug!("Sync ({kind:?}) for room {room_id}: {changed:?}");

    if registry.current().is_none() {
        registry.set_current(Some(&room_id));
    }

    effects
        .notify
        .extend(changed.into_iter().map(|channel| (room_id.clone(), channel)));
}

fn merge_room(
    room: &mut RoomState,
    status: Option<ConnectionStatus>,
    storage: Option<Vec<TreeNode>>,
    me: Option<UserNode>,
    others: Option<Vec<UserNode>>,
    replace: bool,
) -> Vec<Channel> {
    let mut changed = Vec::new();
    merge_field(&mut room.status, status, replace, Channel::Status, &mut changed);
    merge_field(&mut room.storage, storage.map(Rc::new), replace, Channel::Storage, &mut changed);
    merge_field(&mut room.me, me.map(Rc::new), replace, Channel::Me, &mut changed);
    merge_field(&mut room.others, others.map(Rc::new), replace, Channel::Others, &mut changed);
    changed
}

/// Present fields overwrite; absent fields are kept, or cleared in replace mode.
fn merge_field<T>(slot: &mut Option<T>, incoming: Option<T>, replace: bool, channel: Channel, changed: &mut Vec<Channel>) {
    match incoming {
        Some(value) => {
            *slot = Some(value);
            changed.push(channel);
        }
        None if replace && slot.is_some() => {
            *slot = None;
            changed.push(channel);
        }
        None => {}
    }
}
