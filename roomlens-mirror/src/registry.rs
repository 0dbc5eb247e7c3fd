//! Registry of mirrored rooms and the current-room pointer.
//!
//! Invariant: `current`, when set, is always a key of `rooms`. Every
//! mutation that removes the current room reassigns the pointer in the same
//! call, to the first remaining room in insertion order (or `None`).

use std::rc::Rc;

use indexmap::IndexMap;

use crate::protocol::{ConnectionStatus, RoomId};
use crate::tree::{TreeNode, UserNode};

/// Mirrored state of one room. Every field is absent until first reported.
///
/// Trees are held behind `Rc` so snapshots handed to consumers are cheap and
/// stay pointer-identical until the field is overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomState {
    pub status: Option<ConnectionStatus>,
    pub storage: Option<Rc<Vec<TreeNode>>>,
    pub me: Option<Rc<UserNode>>,
    pub others: Option<Rc<Vec<UserNode>>>,
}

impl RoomState {
    /// Remote participants, with an empty list reported as `None`.
    pub fn others_normalized(&self) -> Option<&Rc<Vec<UserNode>>> {
        self.others.as_ref().filter(|others| !others.is_empty())
    }

    /// Whether no field has been reported yet.
    pub fn is_blank(&self) -> bool {
        self.status.is_none() && self.storage.is_none() && self.me.is_none() && self.others.is_none()
    }
}

/// Mapping room id → mirrored state, plus the current selection.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: IndexMap<RoomId, RoomState>,
    /// Ordered id list, recomputed on every insert/remove.
    ids: Vec<RoomId>,
    current: Option<RoomId>,
    /// Bumped whenever the id set or the current pointer changes.
    revision: u64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room, creating a blank one if unseen.
    ///
    /// The flag is `true` only when a room was created.
    pub fn get_or_create(&mut self, room_id: &str) -> (&mut RoomState, bool) {
        let created = !self.rooms.contains_key(room_id);
        if created {
            self.rooms.insert(room_id.to_string(), RoomState::default());
            self.recompute_ids();
            log::info!("Room {room_id} registered ({} known)", self.rooms.len());
        }
        (self.rooms.entry(room_id.to_string()).or_default(), created)
    }

    /// Remove a room. Returns whether a removal happened.
    ///
    /// Removing the current room selects the first remaining room.
    pub fn remove(&mut self, room_id: &str) -> bool {
        if self.rooms.shift_remove(room_id).is_none() {
            return false;
        }
        self.recompute_ids();
        log::info!("Room {room_id} removed ({} known)", self.rooms.len());

        if self.current.as_deref() == Some(room_id) {
            self.current = self.ids.first().cloned();
        }
        true
    }

    /// Explicit selection. Ignored when `room_id` is unknown.
    ///
    /// Returns whether the pointer changed.
    pub fn set_current(&mut self, room_id: Option<&str>) -> bool {
        if let Some(id) = room_id {
            if !self.rooms.contains_key(id) {
                log::debug!("Ignoring selection of unknown room {id}");
                return false;
            }
        }
        self.point_at(room_id.map(str::to_string))
    }

    /// Select `candidate` only when nothing valid is selected.
    ///
    /// A missing or unknown candidate falls back to the first known room.
    /// Returns whether the pointer changed.
    pub fn soft_set_current(&mut self, candidate: Option<&str>) -> bool {
        if self.current_is_valid() {
            return false;
        }
        let next = candidate
            .filter(|id| self.rooms.contains_key(*id))
            .map(str::to_string)
            .or_else(|| self.ids.first().cloned());
        self.point_at(next)
    }

    fn point_at(&mut self, next: Option<RoomId>) -> bool {
        if self.current == next {
            return false;
        }
        self.current = next;
        self.revision += 1;
        true
    }

    fn current_is_valid(&self) -> bool {
        self.current
            .as_deref()
            .is_some_and(|id| self.rooms.contains_key(id))
    }

    fn recompute_ids(&mut self) {
        self.ids = self.rooms.keys().cloned().collect();
        self.revision += 1;
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_room(&self) -> Option<&RoomState> {
        self.current.as_deref().and_then(|id| self.rooms.get(id))
    }

    pub fn get(&self, room_id: &str) -> Option<&RoomState> {
        self.rooms.get(room_id)
    }

    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut RoomState> {
        self.rooms.get_mut(room_id)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Known room ids in insertion order.
    pub fn room_ids(&self) -> &[RoomId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Forget every room and the selection. Returns the removed ids.
    pub fn clear(&mut self) -> Vec<RoomId> {
        let removed = std::mem::take(&mut self.ids);
        if !removed.is_empty() || self.current.is_some() {
            self.rooms.clear();
            self.current = None;
            self.revision += 1;
        }
        removed
    }
}
