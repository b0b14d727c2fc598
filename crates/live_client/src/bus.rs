use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    task::{Context, Poll},
};

use futures::Stream;
use shared::protocol::Frame;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

pub type FrameHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fans every decoded frame out to all registered handlers, in registration
/// order, on the dispatching task.
#[derive(Clone, Default)]
pub struct FrameBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, FrameHandler)>>,
}

impl BusInner {
    fn handlers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, FrameHandler)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }
}

impl FrameBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.handlers().push((id, Arc::new(handler)));
        debug!(subscription = id.0, "live_client: frame subscriber registered");
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Async view over the bus; frames are buffered until polled.
    pub fn stream(&self) -> FrameStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |frame| {
            let _ = tx.send(frame.clone());
        });
        FrameStream {
            frames: UnboundedReceiverStream::new(rx),
            _subscription: subscription,
        }
    }

    /// Delivers `frame` to every handler registered at the time of the call
    /// and returns how many were invoked.
    pub fn publish(&self, frame: &Frame) -> usize {
        // Snapshot so handlers may (un)subscribe while being dispatched.
        let handlers: Vec<FrameHandler> = self
            .inner
            .handlers()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in &handlers {
            handler(frame);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers().len()
    }
}

/// Capability for exactly one registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: SubscriptionId,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove(self.id) {
                debug!(subscription = self.id.0, "live_client: frame subscriber removed");
            }
        }
    }
}

pub struct FrameStream {
    frames: UnboundedReceiverStream<Frame>,
    _subscription: Subscription,
}

impl Stream for FrameStream {
    type Item = Frame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().frames).poll_next(cx)
    }
}

#[cfg(test)]
#[path = "tests/bus_tests.rs"]
mod tests;
