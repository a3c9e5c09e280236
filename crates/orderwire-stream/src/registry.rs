//! Callback registry with snapshot dispatch.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

trait Unsubscribe: Send + Sync {
    fn remove(&self, id: u64) -> bool;
}

struct Slots<T> {
    next_id: AtomicU64,
    callbacks: Mutex<BTreeMap<u64, Callback<T>>>,
}

impl<T> Unsubscribe for Slots<T> {
    fn remove(&self, id: u64) -> bool {
        self.callbacks.lock().remove(&id).is_some()
    }
}

/// Ordered set of callbacks for one kind of notification.
///
/// Callbacks run in subscription order. [`dispatch`](Self::dispatch) works
/// on a snapshot taken when it starts, and skips any callback removed while
/// the dispatch is running, so a callback is never invoked after its
/// [`Subscription::unsubscribe`] returns.
pub struct SubscriberRegistry<T> {
    slots: Arc<Slots<T>>,
}

impl<T: 'static> SubscriberRegistry<T> {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Slots {
                next_id: AtomicU64::new(1),
                callbacks: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Register `callback`.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.slots.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.slots.callbacks.lock().insert(id, Arc::new(callback));
        let registry: Weak<Slots<T>> = Arc::downgrade(&self.slots);
        let registry: Weak<dyn Unsubscribe> = registry;
        Subscription { id, registry }
    }

    /// Invoke every current callback with `value`. Returns how many ran.
    pub fn dispatch(&self, value: &T) -> usize {
        let snapshot: Vec<(u64, Callback<T>)> = self
            .slots
            .callbacks
            .lock()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        let mut invoked = 0;
        for (id, callback) in snapshot {
            if !self.slots.callbacks.lock().contains_key(&id) {
                continue;
            }
            callback(value);
            invoked += 1;
        }
        invoked
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.slots.callbacks.lock().len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle leaves the callback registered.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Unsubscribe>,
}

impl Subscription {
    /// Registry-local id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the callback. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id))
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
