//! Store subscriptions - Callbacks keyed by key path.
//!
//! Subscriptions are registered on the graph's [`StoreState`], not on a
//! single store, so the key is always a full path from the root.
//!
//! A [`StoreSubscription`] only holds a weak reference to the graph. Once
//! every store of the graph is dropped, unsubscribing and resubscribing
//! become no-ops.

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use super::{StateInner, Store, StoreState};
use crate::error::{Error, Result};
use crate::key::Key;
use crate::value::Value;

/// Subscriber callback: `(new_value, old_value, origin)`.
pub type Callback = Rc<dyn Fn(&Value, &Value, Option<&str>)>;

static NEXT_SUBSCRIBER: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Subscriber {
    id: u64,
    callback: Callback,
}

impl StoreState {
    /// Snapshot of the callbacks for `key`, in subscription order.
    pub(crate) fn callbacks(&self, key: &str) -> Vec<Callback> {
        self.0
            .registry
            .borrow()
            .get(key)
            .map(|subscribers| subscribers.iter().map(|s| s.callback.clone()).collect())
            .unwrap_or_default()
    }
}

/// A subscription to one key path of a store.
///
/// Can be unsubscribed and resubscribed any number of times. Dropping the
/// handle does not unsubscribe.
pub struct StoreSubscription {
    state: Weak<StateInner>,
    key: String,
    id: u64,
    callback: Callback,
    active: Cell<bool>,
}

impl StoreSubscription {
    fn new(state: &StoreState, key: String, callback: Callback) -> Self {
        let subscription = Self {
            state: state.downgrade(),
            key,
            id: NEXT_SUBSCRIBER.fetch_add(1, Ordering::Relaxed),
            callback,
            active: Cell::new(false),
        };
        subscription.resubscribe();
        subscription
    }

    /// The key path this subscription listens to.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.active.get() && self.state.strong_count() > 0
    }

    /// Stop receiving notifications. No-op if already unsubscribed.
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        let Some(state) = self.state.upgrade() else {
            return;
        };

        let mut registry = state.registry.borrow_mut();
        if let Some(subscribers) = registry.get_mut(&self.key) {
            subscribers.retain(|subscriber| subscriber.id != self.id);
            if subscribers.is_empty() {
                registry.shift_remove(&self.key);
            }
        }

        trace!(state = state.id, key = %self.key, "unsubscribed");
    }

    /// Receive notifications again. No-op if already subscribed.
    pub fn resubscribe(&self) {
        if self.active.get() {
            return;
        }
        let Some(state) = self.state.upgrade() else {
            return;
        };
        self.active.set(true);

        state
            .registry
            .borrow_mut()
            .entry(self.key.clone())
            .or_default()
            .push(Subscriber {
                id: self.id,
                callback: self.callback.clone(),
            });

        trace!(state = state.id, key = %self.key, "subscribed");
    }
}

impl std::fmt::Debug for StoreSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSubscription")
            .field("key", &self.key)
            .field("active", &self.active.get())
            .finish()
    }
}

/// Subscribe to value changes for a key path of a store's graph.
///
/// The key may be a number, a string or a [`Symbol`](crate::key::Symbol).
/// A `serde_json::Value` that is anything else fails with
/// `Error::InvalidKey`.
pub fn subscribe<K, F>(store: &Store, key: K, callback: F) -> Result<StoreSubscription>
where
    K: TryInto<Key>,
    Error: From<K::Error>,
    F: Fn(&Value, &Value, Option<&str>) + 'static,
{
    let key: Key = key.try_into()?;
    Ok(subscribe_state(store.state(), key.to_string(), Rc::new(callback)))
}

pub(crate) fn subscribe_state(
    state: &StoreState,
    key: String,
    callback: Callback,
) -> StoreSubscription {
    StoreSubscription::new(state, key, callback)
}
