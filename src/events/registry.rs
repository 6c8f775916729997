// src/events/registry.rs

//! Thread-safe set of a task's live subscriptions.

use std::sync::Mutex;

use tracing::trace;

use crate::events::source::Subscription;
use crate::sync::lock;

/// The set of subscriptions a task currently holds.
///
/// `add`, `remove_one` and `drain_all` are serialized by one lock, so the set
/// is never observed half-updated. Entries are detached under the lock and
/// cancelled after it is released: cancelling may wait for an in-flight
/// handler, and that handler may itself be calling into this registry.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `subscription`. Already-cancelled subscriptions are ignored.
    ///
    /// Returns whether the subscription was added.
    pub fn add(&self, subscription: Subscription) -> bool {
        let mut subscriptions = lock(&self.subscriptions);
        // Checked under the lock: a concurrent `drain_all` cannot slip between.
        if !subscription.is_active() {
            trace!(subscription = subscription.id(), "ignoring inactive subscription");
            return false;
        }
        subscriptions.push(subscription);
        true
    }

    /// Unregister `subscription` from its source and forget it.
    pub fn remove_one(&self, subscription: &Subscription) {
        lock(&self.subscriptions).retain(|s| s != subscription);
        subscription.cancel();
    }

    /// Unregister every subscription and empty the set.
    ///
    /// Returns how many subscriptions were removed.
    pub fn drain_all(&self) -> usize {
        let drained: Vec<Subscription> = std::mem::take(&mut *lock(&self.subscriptions));
        for subscription in &drained {
            subscription.cancel();
        }
        if !drained.is_empty() {
            trace!(count = drained.len(), "drained subscriptions");
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::events::source::{EventKind, EventSource};

    #[test]
    fn add_remove_and_drain() {
        let source = EventSource::new(EventKind::DataAvailable);
        let registry = SubscriptionRegistry::new();

        let a = source.subscribe(|_| {});
        let b = source.subscribe(|_| {});
        assert!(registry.add(a.clone()));
        assert!(registry.add(b.clone()));
        assert_eq!(registry.len(), 2);

        registry.remove_one(&a);
        assert_eq!(registry.len(), 1);
        assert!(!a.is_active());

        // Removing twice is harmless.
        registry.remove_one(&a);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.drain_all(), 1);
        assert!(registry.is_empty());
        assert!(!b.is_active());
        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(registry.drain_all(), 0);
    }

    #[test]
    fn cancelled_subscription_is_not_added() {
        let source = EventSource::new(EventKind::Terminated);
        let registry = SubscriptionRegistry::new();

        let sub = source.subscribe(|_| {});
        sub.cancel();

        assert!(!registry.add(sub));
        assert!(registry.is_empty());
    }

    #[test]
    fn handler_draining_the_registry_from_inside_delivery() {
        let source = EventSource::new(EventKind::Terminated);
        let registry = Arc::new(SubscriptionRegistry::new());

        let other = source.subscribe(|_| {});
        let weak = Arc::downgrade(&registry);
        let me = source.subscribe(move |_| {
            if let Some(registry) = weak.upgrade() {
                registry.drain_all();
            }
        });
        registry.add(me.clone());
        registry.add(other.clone());

        source.emit();

        assert!(registry.is_empty());
        assert!(!me.is_active());
        assert!(!other.is_active());
        assert_eq!(source.emit(), 0);
    }

    #[test]
    fn concurrent_adds_and_drains_leave_no_live_strays() {
        let source = EventSource::new(EventKind::DataAvailable);
        let registry = Arc::new(SubscriptionRegistry::new());

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let source = source.clone();
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..200 {
                        registry.add(source.subscribe(|_| {}));
                    }
                })
            })
            .collect();

        let drainer = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..50 {
                    registry.drain_all();
                    thread::yield_now();
                }
            })
        };

        for w in workers {
            w.join().unwrap();
        }
        drainer.join().unwrap();

        let remaining = registry.len();
        assert_eq!(source.subscriber_count(), remaining);
        registry.drain_all();
        assert_eq!(source.subscriber_count(), 0);
    }
}
