//! Serializing queue in front of a [`Mirror`].
//!
//! ```text
//! transport task ──┐
//!                  ├── DispatchHandle ── mpsc ──► DispatchQueue::run(&Mirror)
//! other task   ────┘                               (one message at a time)
//! ```
//!
//! The mirror itself is single-threaded. Hosts that receive frames on
//! several tasks push them through a handle; the queue owner applies them
//! in arrival order on the mirror's thread.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::engine::Mirror;
use crate::error::{MirrorError, MirrorResult};
use crate::protocol::InboundMessage;

/// One queued unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Message(InboundMessage),
    /// Undecoded frame; decoded by the mirror with its source filter.
    Raw(String),
}

/// Producer side. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Dispatch>,
}

impl DispatchHandle {
    pub async fn send(&self, msg: InboundMessage) -> MirrorResult<()> {
        self.push(Dispatch::Message(msg)).await
    }

    pub async fn send_raw(&self, frame: impl Into<String>) -> MirrorResult<()> {
        self.push(Dispatch::Raw(frame.into())).await
    }

    /// Non-blocking enqueue.
    ///
    /// `DispatchFull` is transient backpressure; `DispatchClosed` is final.
    pub fn try_send(&self, msg: InboundMessage) -> MirrorResult<()> {
        self.tx.try_send(Dispatch::Message(msg)).map_err(|e| match e {
            TrySendError::Full(_) => {
                log::debug!("Dispatch queue full");
                MirrorError::DispatchFull
            }
            TrySendError::Closed(_) => {
                log::warn!("Dispatch queue closed");
                MirrorError::DispatchClosed
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn push(&self, item: Dispatch) -> MirrorResult<()> {
        self.tx.send(item).await.map_err(|_| MirrorError::DispatchClosed)
    }
}

/// Consumer side, owned by whoever owns the mirror.
#[derive(Debug)]
pub struct DispatchQueue {
    rx: mpsc::Receiver<Dispatch>,
}

impl DispatchQueue {
    /// Apply messages until every handle is dropped.
    ///
    /// Returns the number of items processed. Malformed raw frames are
    /// logged and skipped.
    pub async fn run(mut self, mirror: &Mirror) -> usize {
        let mut processed = 0;
        while let Some(item) = self.rx.recv().await {
            apply(mirror, item);
            processed += 1;
        }
        log::debug!("Dispatch queue drained after {processed} items");
        processed
    }

    /// Apply only what is already queued.
    pub fn drain_pending(&mut self, mirror: &Mirror) -> usize {
        let mut processed = 0;
        while let Ok(item) = self.rx.try_recv() {
            apply(mirror, item);
            processed += 1;
        }
        processed
    }
}

fn apply(mirror: &Mirror, item: Dispatch) {
    match item {
        Dispatch::Message(msg) => {
            mirror.handle(msg);
        }
        Dispatch::Raw(frame) => {
            if let Err(e) = mirror.handle_raw(&frame) {
                log::warn!("Skipping queued frame: {e}");
            }
        }
    }
}

/// Bounded queue holding at most `capacity` undelivered items.
pub fn dispatch_queue(capacity: usize) -> (DispatchHandle, DispatchQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DispatchHandle { tx }, DispatchQueue { rx })
}

impl Mirror {
    /// Queue sized from `MirrorConfig::dispatch_capacity`.
    pub fn dispatch_queue(&self) -> (DispatchHandle, DispatchQueue) {
        dispatch_queue(self.config().dispatch_capacity)
    }
}
