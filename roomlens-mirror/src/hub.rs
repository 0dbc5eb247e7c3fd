//! Per-room notification fan-out.
//!
//! ```text
//! EventHub (one per room)
//!   ├── status  ── Signal ──► [listener, listener, …]
//!   ├── me      ── Signal ──► [...]
//!   ├── others  ── Signal ──► [...]
//!   └── storage ── Signal ──► [...]
//! ```
//!
//! A [`Signal`] carries no payload: it only says "something changed", and
//! listeners pull the latest snapshot through the facade. Everything here is
//! single-threaded (`Rc`), matching the one-message-at-a-time engine.
//!
//! Listeners may subscribe or unsubscribe from inside a notification. A pass
//! iterates over the listener list as it was when `notify` started; listeners
//! removed mid-pass are skipped if they have not run yet, listeners added
//! mid-pass first run on the next pass.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// One of the four independent notification lines of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Status,
    Me,
    Others,
    Storage,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Status, Channel::Me, Channel::Others, Channel::Storage];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Status => "status",
            Channel::Me => "me",
            Channel::Others => "others",
            Channel::Storage => "storage",
        }
    }
}

struct ListenerSlot {
    id: u64,
    callback: Rc<dyn Fn()>,
    active: Rc<Cell<bool>>,
}

#[derive(Default)]
struct SignalInner {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<ListenerSlot>>,
}

/// Payload-free fan-out to zero or more listeners.
#[derive(Clone, Default)]
pub struct Signal {
    inner: Rc<SignalInner>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is unsubscribed or dropped.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let active = Rc::new(Cell::new(true));
        self.inner.listeners.borrow_mut().push(ListenerSlot {
            id,
            callback: Rc::new(listener),
            active: Rc::clone(&active),
        });

        Subscription {
            signal: Rc::downgrade(&self.inner),
            id,
            active,
            detached: false,
            on_release: RefCell::new(None),
        }
    }

    /// Invoke every registered listener in registration order.
    ///
    /// Returns the number of listeners invoked.
    pub fn notify(&self) -> usize {
        // No borrow is held while callbacks run.
        let pass: Vec<(Rc<dyn Fn()>, Rc<Cell<bool>>)> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|slot| (Rc::clone(&slot.callback), Rc::clone(&slot.active)))
            .collect();

        let mut invoked = 0;
        for (callback, active) in pass {
            if active.get() {
                callback();
                invoked += 1;
            }
        }
        invoked
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Drop every listener; outstanding subscriptions become inert.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.listeners.borrow_mut());
        for slot in removed {
            slot.active.set(false);
        }
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle that removes exactly one listener.
///
/// Unsubscribing twice is a no-op, and so is unsubscribing after the signal
/// itself has been dropped. Dropping the handle unsubscribes unless it was
/// [`detach`](Subscription::detach)ed.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    signal: Weak<SignalInner>,
    id: u64,
    active: Rc<Cell<bool>>,
    detached: bool,
    /// Runs once, right after the listener is removed.
    on_release: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(inner) = self.signal.upgrade() {
            inner.listeners.borrow_mut().retain(|slot| slot.id != self.id);
        }
        let hook = self.on_release.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Attach a hook run after this subscription removes its listener.
    ///
    /// Not run when the signal is cleared or the subscription is detached.
    pub(crate) fn on_release(self, hook: impl FnOnce() + 'static) -> Self {
        *self.on_release.borrow_mut() = Some(Box::new(hook));
        self
    }

    /// Whether the listener is still registered on a live signal.
    pub fn is_active(&self) -> bool {
        self.active.get() && self.signal.strong_count() > 0
    }

    /// Keep the listener registered for the rest of the signal's lifetime.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Four independent signals for one room.
#[derive(Debug, Default)]
pub struct EventHub {
    status: Signal,
    me: Signal,
    others: Signal,
    storage: Signal,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, channel: Channel) -> &Signal {
        match channel {
            Channel::Status => &self.status,
            Channel::Me => &self.me,
            Channel::Others => &self.others,
            Channel::Storage => &self.storage,
        }
    }

    pub fn subscribe(&self, channel: Channel, listener: impl Fn() + 'static) -> Subscription {
        self.channel(channel).subscribe(listener)
    }

    pub fn notify(&self, channel: Channel) -> usize {
        self.channel(channel).notify()
    }

    pub fn listener_count(&self) -> usize {
        Channel::ALL.iter().map(|c| self.channel(*c).listener_count()).sum()
    }

    /// Detach all listeners on every channel.
    pub fn close(&self) {
        for channel in Channel::ALL {
            self.channel(channel).clear();
        }
    }
}
