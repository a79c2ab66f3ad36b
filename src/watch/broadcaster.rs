//! Fan-out of change events to independent subscriber queues.
//!
//! Every subscriber owns a bounded tokio mpsc queue. `publish` never waits:
//! it uses `try_send`, so a full queue loses the event for that subscriber
//! only and a slow consumer can never stall the polling loop that publishes.

use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::task::Context;
use std::task::Poll;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::trace;

use super::ChangeEvent;
use crate::metrics::EVENTS_DROPPED;
use crate::metrics::EVENTS_PUBLISHED;

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<ChangeEvent>,
}

struct BroadcasterInner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    buffer_size: usize,
}

impl BroadcasterInner {
    fn unsubscribe(
        &self,
        id: u64,
    ) {
        self.subscribers.lock().retain(|s| s.id != id);
    }
}

/// Delivers each published [`ChangeEvent`] to every current subscriber
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_shutdown())
            .field("buffer_size", &self.inner.buffer_size)
            .finish()
    }
}

impl Broadcaster {
    /// Creates a broadcaster whose subscribers each buffer up to `buffer_size` events
    pub fn new(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                buffer_size: buffer_size.max(1),
            }),
        }
    }

    /// Registers a new subscriber.
    ///
    /// After [`shutdown`](Self::shutdown) the returned stream is already closed.
    pub fn subscribe(&self) -> EventStream {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.buffer_size);

        let mut subscribers = self.inner.subscribers.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            // `sender` drops here, the receiver yields `None` right away
            return EventStream::closed(id, receiver);
        }
        subscribers.push(Subscriber { id, sender });
        trace!(subscriber_id = id, "Subscriber registered");

        EventStream {
            id,
            receiver,
            broadcaster: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to every subscriber with room in its queue.
    ///
    /// Returns false when the broadcaster is shut down and nothing was delivered.
    pub fn publish(
        &self,
        event: ChangeEvent,
    ) -> bool {
        let mut subscribers = self.inner.subscribers.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return false;
        }

        subscribers.retain(|s| match s.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                EVENTS_DROPPED.inc();
                trace!(subscriber_id = s.id, "Subscriber queue full, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                trace!(subscriber_id = s.id, "Subscriber gone, pruned");
                false
            }
        });
        EVENTS_PUBLISHED.inc();
        true
    }

    /// Closes every subscriber stream and rejects further subscriptions and events.
    ///
    /// Idempotent: only the first call has any effect.
    pub fn shutdown(&self) {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let subscribers = std::mem::take(&mut *self.inner.subscribers.lock());
        debug!(subscribers = subscribers.len(), "Broadcaster shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// Consumer side of one subscription.
///
/// Yields events in publish order and `None` once the broadcaster shut down
/// (after any events that were queued before). Dropping the stream unsubscribes.
pub struct EventStream {
    id: u64,
    receiver: mpsc::Receiver<ChangeEvent>,
    broadcaster: Weak<BroadcasterInner>,
}

impl EventStream {
    fn closed(
        id: u64,
        receiver: mpsc::Receiver<ChangeEvent>,
    ) -> Self {
        Self {
            id,
            receiver,
            broadcaster: Weak::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next event; `None` means the stream is closed
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// Returns a queued event without waiting
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Stops the subscription. Events already queued can still be drained.
    pub fn close(&mut self) {
        self.receiver.close();
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(inner) = self.broadcaster.upgrade() {
            inner.unsubscribe(self.id);
        }
        self.broadcaster = Weak::new();
    }
}

impl Stream for EventStream {
    type Item = ChangeEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EventStream").field("id", &self.id).finish_non_exhaustive()
    }
}
