//! The mirror context: registry + hubs + outbound channel.
//!
//! ```text
//!  inbound frame
//!       │
//!       ▼
//!  Mirror::handle_raw() ── decode ──► Mirror::handle()
//!                                         │
//!                                         ▼
//!                                  reduce(&mut registry)
//!                                         │ Effects
//!            ┌────────────────┬───────────┼──────────────────┐
//!            ▼                ▼           ▼                  ▼
//!     OutboundSink      drop hubs of   rooms Signal    EventHub channels
//!   (connect/sub/unsub) removed rooms  (list/current)  (status/me/others/storage)
//! ```
//!
//! One `Mirror` is created when the panel attaches and dropped when it
//! detaches. Cloning the handle shares the same state. All work happens
//! synchronously inside `handle`; the caller must not deliver messages
//! concurrently (see [`crate::dispatch`] for a serializing queue).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::config::{HubLifecycle, MirrorConfig};
use crate::error::{MirrorError, MirrorResult};
use crate::facade::MirrorView;
use crate::hub::{EventHub, Signal};
use crate::protocol::{decode_inbound, InboundMessage, OutboundMessage, RoomId};
use crate::reducer::{reduce, Effects, SelectionChange};
use crate::registry::RoomRegistry;

/// Destination for control messages addressed to the client.
///
/// Delivery is fire-and-forget: the mirror never retries.
pub trait OutboundSink {
    fn send(&mut self, msg: OutboundMessage);
}

impl OutboundSink for Vec<OutboundMessage> {
    fn send(&mut self, msg: OutboundMessage) {
        self.push(msg);
    }
}

impl OutboundSink for Rc<RefCell<Vec<OutboundMessage>>> {
    fn send(&mut self, msg: OutboundMessage) {
        self.borrow_mut().push(msg);
    }
}

impl OutboundSink for tokio::sync::mpsc::UnboundedSender<OutboundMessage> {
    fn send(&mut self, msg: OutboundMessage) {
        if let Err(e) = tokio::sync::mpsc::UnboundedSender::send(self, msg) {
            log::warn!("Outbound channel closed; dropping {:?}", e.0);
        }
    }
}

/// Sink that discards everything (read-only replay, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutboundSink for NullSink {
    fn send(&mut self, _msg: OutboundMessage) {}
}

/// Sink that encodes wire frames stamped with the panel's `source` tag.
#[derive(Debug, Clone)]
pub struct FrameSink {
    source: String,
    tx: tokio::sync::mpsc::UnboundedSender<String>,
}

impl FrameSink {
    pub fn new(config: &MirrorConfig, tx: tokio::sync::mpsc::UnboundedSender<String>) -> Self {
        Self {
            source: config.panel_source.clone(),
            tx,
        }
    }
}

impl OutboundSink for FrameSink {
    fn send(&mut self, msg: OutboundMessage) {
        match msg.encode(&self.source) {
            Ok(frame) => {
                if self.tx.send(frame).is_err() {
                    log::warn!("Frame channel closed; dropping {msg:?}");
                }
            }
            Err(e) => log::warn!("Failed to encode {msg:?}: {e}"),
        }
    }
}

pub(crate) struct MirrorInner {
    pub(crate) config: MirrorConfig,
    pub(crate) registry: RefCell<RoomRegistry>,
    pub(crate) hubs: RefCell<HashMap<RoomId, Rc<EventHub>>>,
    pub(crate) rooms_signal: Signal,
    outbound: RefCell<Box<dyn OutboundSink>>,
}

impl MirrorInner {
    /// Hub for `room_id`, created on first reference.
    pub(crate) fn hub(&self, room_id: &str) -> Rc<EventHub> {
        let mut hubs = self.hubs.borrow_mut();
        if let Some(hub) = hubs.get(room_id) {
            return Rc::clone(hub);
        }
        let hub = Rc::new(EventHub::new());
        hubs.insert(room_id.to_string(), Rc::clone(&hub));
        hub
    }

    fn existing_hub(&self, room_id: &str) -> Option<Rc<EventHub>> {
        self.hubs.borrow().get(room_id).cloned()
    }

    /// Drop the hub of an unknown room once its last listener is gone.
    ///
    /// Skipped while the registry or hub map is borrowed; the next
    /// [`sweep_hubs`](Self::sweep_hubs) catches it.
    pub(crate) fn release_hub(&self, room_id: &str) {
        if self.config.hub_lifecycle != HubLifecycle::BoundToRoom {
            return;
        }
        let Ok(registry) = self.registry.try_borrow() else {
            return;
        };
        if registry.contains(room_id) {
            return;
        }
        let Ok(mut hubs) = self.hubs.try_borrow_mut() else {
            return;
        };
        if hubs.get(room_id).is_some_and(|hub| hub.listener_count() == 0) {
            hubs.remove(room_id);
            log::trace!("Hub for unknown room {room_id} released");
        }
    }

    /// Drop every idle hub whose room is not in the registry.
    fn sweep_hubs(&self) {
        if self.config.hub_lifecycle != HubLifecycle::BoundToRoom {
            return;
        }
        let registry = self.registry.borrow();
        self.hubs
            .borrow_mut()
            .retain(|room_id, hub| hub.listener_count() > 0 || registry.contains(room_id));
    }
}

/// Live mirror of every room announced by the client.
#[derive(Clone)]
pub struct Mirror {
    inner: Rc<MirrorInner>,
}

impl Mirror {
    pub fn new(config: MirrorConfig, outbound: impl OutboundSink + 'static) -> Self {
        Self {
            inner: Rc::new(MirrorInner {
                config,
                registry: RefCell::new(RoomRegistry::new()),
                hubs: RefCell::new(HashMap::new()),
                rooms_signal: Signal::new(),
                outbound: RefCell::new(Box::new(outbound)),
            }),
        }
    }

    /// Mirror with default configuration.
    pub fn with_sink(outbound: impl OutboundSink + 'static) -> Self {
        Self::new(MirrorConfig::default(), outbound)
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.inner.config
    }

    /// Read/subscribe handle for consumers.
    pub fn view(&self) -> MirrorView {
        MirrorView::new(Rc::clone(&self.inner))
    }

    /// Apply one decoded inbound message and fire its notifications.
    pub fn handle(&self, msg: InboundMessage) -> Effects {
        log::debug!("Inbound {} {:?}", msg.tag(), msg.room_id());
        let effects = {
            let mut registry = self.inner.registry.borrow_mut();
            reduce(&mut registry, msg, self.inner.config.full_sync)
        };
        self.apply(&effects);
        effects
    }

    /// Decode and apply one raw frame.
    ///
    /// Frames from other sources are skipped. An unrecognized message type
    /// is a defect when `strict_protocol` is set (debug assertion) and is
    /// otherwise logged and ignored. Malformed frames are reported as errors
    /// without touching any state.
    pub fn handle_raw(&self, text: &str) -> MirrorResult<()> {
        match decode_inbound(text, &self.inner.config.client_source) {
            Ok(Some(msg)) => {
                self.handle(msg);
                Ok(())
            }
            Ok(None) => {
                log::trace!("Skipping frame from another source");
                Ok(())
            }
            Err(MirrorError::UnknownMessage(tag)) => {
                debug_assert!(
                    !self.inner.config.strict_protocol,
                    "Unrecognized devtools message: {tag}"
                );
                log::warn!("Ignoring unrecognized message type {tag}");
                Ok(())
            }
            Err(e) => {
                log::warn!("Dropping malformed frame: {e}");
                Err(e)
            }
        }
    }

    /// Explicit (user-driven) room selection.
    ///
    /// Unknown ids are ignored. Returns whether the selection changed.
    pub fn select_room(&self, room_id: Option<&str>) -> bool {
        let change = {
            let mut registry = self.inner.registry.borrow_mut();
            let previous = registry.current().map(str::to_string);
            if !registry.set_current(room_id) {
                return false;
            }
            SelectionChange {
                previous,
                current: registry.current().map(str::to_string),
            }
        };
        log::info!("Room selected: {:?} → {:?}", change.previous, change.current);

        let effects = Effects {
            rooms_changed: true,
            outbound: change.messages(),
            selection: Some(change),
            ..Effects::default()
        };
        self.apply(&effects);
        true
    }

    /// Forget every room, e.g. after the inspected client reloads.
    ///
    /// Unsubscribes from the current room and tears down all hubs.
    pub fn reset(&self) {
        let (removed, previous) = {
            let mut registry = self.inner.registry.borrow_mut();
            let previous = registry.current().map(str::to_string);
            (registry.clear(), previous)
        };
        if removed.is_empty() {
            return;
        }
        log::info!("Mirror reset; {} rooms dropped", removed.len());

        let change = SelectionChange { previous, current: None };
        let effects = Effects {
            rooms_changed: true,
            outbound: change.messages(),
            selection: Some(change),
            removed,
            ..Effects::default()
        };
        self.apply(&effects);

        // Reset drops every hub regardless of lifecycle mode.
        let hubs = std::mem::take(&mut *self.inner.hubs.borrow_mut());
        for hub in hubs.values() {
            hub.close();
        }
    }

    /// Number of live hubs (rooms referenced by a message or a subscriber).
    pub fn hub_count(&self) -> usize {
        self.inner.hubs.borrow().len()
    }

    fn apply(&self, effects: &Effects) {
        if !effects.outbound.is_empty() {
            let mut sink = self.inner.outbound.borrow_mut();
            for msg in &effects.outbound {
                log::debug!("Outbound {msg:?}");
                sink.send(msg.clone());
            }
        }

        if self.inner.config.hub_lifecycle == HubLifecycle::BoundToRoom && !effects.removed.is_empty() {
            let dropped: Vec<Rc<EventHub>> = {
                let mut hubs = self.inner.hubs.borrow_mut();
                effects.removed.iter().filter_map(|id| hubs.remove(id)).collect()
            };
            for hub in dropped {
                hub.close();
            }
        }

        if effects.rooms_changed {
            let n = self.inner.rooms_signal.notify();
            log::trace!("Room list changed; {n} listeners notified");
        }

        // A hub only exists once someone subscribed; listeners above may
        // also have removed the room, so never create one here.
        for (room_id, channel) in &effects.notify {
            let Some(hub) = self.inner.existing_hub(room_id) else {
                continue;
            };
            let n = hub.notify(*channel);
            log::trace!("Room {room_id} {}: {n} listeners notified", channel.as_str());
        }

        self.inner.sweep_hubs();
    }
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.inner.registry.borrow();
        f.debug_struct("Mirror")
            .field("rooms", &registry.room_ids())
            .field("current", &registry.current())
            .field("hubs", &self.inner.hubs.borrow().len())
            .finish()
    }
}
