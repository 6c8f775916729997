// src/events/source.rs

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError, Weak};

use tracing::trace;

use crate::sync::lock;

type Handler = Box<dyn FnMut(&Subscription) + Send>;

thread_local! {
    /// Number of handler invocations currently on this thread's stack.
    static DELIVERY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DeliveryGuard;

impl DeliveryGuard {
    fn enter() -> Self {
        DELIVERY_DEPTH.with(|d| d.set(d.get() + 1));
        DeliveryGuard
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        DELIVERY_DEPTH.with(|d| d.set(d.get() - 1));
    }
}

fn delivering() -> bool {
    DELIVERY_DEPTH.with(|d| d.get() > 0)
}

/// The two kinds of events a task can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// New bytes (or end-of-stream) are available on the output stream.
    DataAvailable,
    /// The child process has terminated. Fires at most once per task.
    Terminated,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::DataAvailable => f.write_str("data-available"),
            EventKind::Terminated => f.write_str("terminated"),
        }
    }
}

/// An observable owned by a single task.
///
/// Cloning yields another handle to the same source.
#[derive(Clone)]
pub struct EventSource {
    kind: EventKind,
    shared: Arc<SourceShared>,
}

struct SourceShared {
    next_id: AtomicU64,
    /// Set by `emit_final`. Only written while `subscribers` is locked.
    finished: AtomicBool,
    subscribers: Mutex<Vec<Arc<SubscriptionInner>>>,
}

impl EventSource {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            shared: Arc::new(SourceShared {
                next_id: AtomicU64::new(1),
                finished: AtomicBool::new(false),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    /// `true` once [`EventSource::emit_final`] has run.
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Register `handler` and return its handle.
    ///
    /// The handle exists before the first delivery; on every firing the
    /// handler receives it, so it can cancel itself. On a finished source
    /// the returned subscription is already inactive and never fires.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&Subscription) + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = lock(&self.shared.subscribers);
        let finished = self.shared.finished.load(Ordering::Acquire);
        let handler: Option<Handler> = if finished {
            None
        } else {
            Some(Box::new(handler))
        };
        let inner = Arc::new(SubscriptionInner {
            id,
            kind: self.kind,
            active: AtomicBool::new(!finished),
            handler: Mutex::new(handler),
            source: Arc::downgrade(&self.shared),
        });

        if finished {
            trace!(event = %self.kind, subscription = id, "source finished; subscription inert");
        } else {
            subscribers.push(Arc::clone(&inner));
            trace!(event = %self.kind, subscription = id, "subscribed");
        }

        Subscription { inner }
    }

    /// Fire the event: invoke every live handler, in subscription order.
    ///
    /// Returns how many handlers actually ran.
    pub fn emit(&self) -> usize {
        let snapshot: Vec<Arc<SubscriptionInner>> = lock(&self.shared.subscribers).clone();
        self.deliver_all(snapshot)
    }

    /// Fire the event one last time. Handlers subscribed afterwards never run.
    pub fn emit_final(&self) -> usize {
        let snapshot = {
            let subscribers = lock(&self.shared.subscribers);
            self.shared.finished.store(true, Ordering::Release);
            subscribers.clone()
        };
        self.deliver_all(snapshot)
    }

    fn deliver_all(&self, snapshot: Vec<Arc<SubscriptionInner>>) -> usize {
        let mut delivered = 0;
        for inner in &snapshot {
            if inner.deliver() {
                delivered += 1;
            }
        }
        trace!(event = %self.kind, delivered, "event emitted");
        delivered
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("kind", &self.kind)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

struct SubscriptionInner {
    id: u64,
    kind: EventKind,
    active: AtomicBool,
    /// Held for the whole duration of a handler invocation.
    handler: Mutex<Option<Handler>>,
    source: Weak<SourceShared>,
}

impl SubscriptionInner {
    fn deliver(self: &Arc<Self>) -> bool {
        let mut slot = lock(&self.handler);
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let Some(handler) = slot.as_mut() else {
            return false;
        };

        let handle = Subscription {
            inner: Arc::clone(self),
        };
        {
            let _guard = DeliveryGuard::enter();
            handler(&handle);
        }

        // The handler may have cancelled itself; drop it now that it returned.
        if !self.active.load(Ordering::Acquire) {
            slot.take();
        }
        true
    }
}

/// A live registration against an [`EventSource`].
///
/// Cloning yields another handle to the same registration.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> EventKind {
        self.inner.kind
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Unregister from the source. Returns `true` if this call did it.
    ///
    /// Called from any thread other than the one delivering to this handler,
    /// it waits for an in-flight invocation to finish; afterwards the handler
    /// never runs again. Called from inside a handler, it returns at once and
    /// the in-flight invocation simply completes.
    pub fn cancel(&self) -> bool {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return false;
        }

        if let Some(source) = self.inner.source.upgrade() {
            lock(&source.subscribers).retain(|s| s.id != self.inner.id);
        }

        if delivering() {
            match self.inner.handler.try_lock() {
                Ok(mut slot) => {
                    slot.take();
                }
                Err(TryLockError::Poisoned(poisoned)) => {
                    poisoned.into_inner().take();
                }
                // In flight further up this stack; `deliver` drops it on return.
                Err(TryLockError::WouldBlock) => {}
            }
        } else {
            lock(&self.inner.handler).take();
        }

        trace!(event = %self.inner.kind, subscription = self.inner.id, "unsubscribed");
        true
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Subscription {}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("active", &self.is_active())
            .finish()
    }
}
