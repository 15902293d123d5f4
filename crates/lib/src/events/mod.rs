//! Event distribution for document observers.
//!
//! The engine raises one synchronous callback per committed transaction (and
//! one per subdocument change). This module turns each of the two callback
//! kinds into any number of independently-paced asynchronous consumers: the
//! first stream of a kind registers exactly one native callback, later
//! streams share it, and the producer side only ever performs a non-blocking
//! enqueue. A queue whose consumer has gone away (or whose bounded buffer is
//! full, which is treated the same way) is evicted without disturbing the
//! other consumers; evicting the last queue unregisters the native callback
//! again.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
    engine::{DocGuid, EngineSubscription},
    transaction::{Origin, TransactionError},
};

/// Event raised once per committed transaction.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    /// Binary update produced by the committed transaction.
    pub update: Vec<u8>,
    /// Origin the transaction was opened with, if any.
    pub origin: Option<Origin>,
}

/// Event raised when subdocuments are added to, removed from or loaded in a
/// document.
#[derive(Debug, Clone, Default)]
pub struct SubdocsEvent {
    pub added: Vec<DocGuid>,
    pub removed: Vec<DocGuid>,
    pub loaded: Vec<DocGuid>,
}

/// Consumer half of one event queue.
///
/// Events arrive in commit order, without duplication. Dropping the stream
/// abandons the queue; the bus notices on the next event and cleans up.
pub struct EventStream<T> {
    rx: StreamReceiver<T>,
}

enum StreamReceiver<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T> EventStream<T> {
    /// Wait for the next event. Returns `None` once the queue has been
    /// evicted (or the document dropped) and all buffered events are drained.
    pub async fn recv(&mut self) -> Option<T> {
        match &mut self.rx {
            StreamReceiver::Bounded(rx) => rx.recv().await,
            StreamReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        match &mut self.rx {
            StreamReceiver::Bounded(rx) => rx.try_recv().ok(),
            StreamReceiver::Unbounded(rx) => rx.try_recv().ok(),
        }
    }
}

enum StreamSender<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> StreamSender<T> {
    /// Non-blocking send. Any failure (consumer gone or buffer full) means
    /// the queue is abandoned.
    fn try_send(&self, event: T) -> Result<(), ()> {
        match self {
            StreamSender::Bounded(tx) => tx.try_send(event).map_err(|_| ()),
            StreamSender::Unbounded(tx) => tx.send(event).map_err(|_| ()),
        }
    }
}

/// All queues of one event kind for one document, plus the shared native
/// callback registration.
pub(crate) struct StreamSet<T> {
    kind: &'static str,
    inner: Mutex<StreamSetInner<T>>,
}

struct StreamSetInner<T> {
    senders: Vec<StreamSender<T>>,
    native: Option<EngineSubscription>,
}

impl<T: Clone> StreamSet<T> {
    pub(crate) fn new(kind: &'static str) -> Arc<Self> {
        Arc::new(StreamSet {
            kind,
            inner: Mutex::new(StreamSetInner {
                senders: Vec::new(),
                native: None,
            }),
        })
    }

    /// Open a new queue, registering the native callback on the first one.
    ///
    /// `capacity` bounds the queue; `None` means unbounded.
    pub(crate) fn subscribe(
        &self,
        capacity: Option<usize>,
        register: impl FnOnce() -> Result<EngineSubscription, TransactionError>,
    ) -> Result<EventStream<T>, TransactionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.native.is_none() {
            inner.native = Some(register()?);
            debug!(kind = self.kind, "registered native event callback");
        }
        let (sender, receiver) = match capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (StreamSender::Bounded(tx), StreamReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (StreamSender::Unbounded(tx), StreamReceiver::Unbounded(rx))
            }
        };
        inner.senders.push(sender);
        trace!(
            kind = self.kind,
            queues = inner.senders.len(),
            "event stream subscribed"
        );
        Ok(EventStream { rx: receiver })
    }

    /// Fan one event out to every live queue, evicting abandoned ones.
    ///
    /// Runs on the committing thread, inside the native callback: it must
    /// never block, so eviction is the only remedy for a queue that cannot
    /// take the event.
    pub(crate) fn publish(&self, event: T) {
        let released;
        {
            let mut inner = self.inner.lock().unwrap();
            let kind = self.kind;
            inner.senders.retain(|sender| {
                let alive = sender.try_send(event.clone()).is_ok();
                if !alive {
                    debug!(kind, "evicting abandoned event stream");
                }
                alive
            });
            released = if inner.senders.is_empty() {
                inner.native.take()
            } else {
                None
            };
        }
        if released.is_some() {
            debug!(kind = self.kind, "unregistered native event callback");
        }
        // `released` drops here, outside our lock.
    }
}
