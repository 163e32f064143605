//! Observation Engine - Re-run a getter when the store keys it read change.
//!
//! [`observe`] runs a getter, records every store key path it reads, and
//! subscribes to those paths. A change to any of them queues one re-run on
//! the next frame, no matter how many keys changed. After every run the
//! result is handed to each active `after` callback.
//!
//! Observations are memoised per getter: observing the same [`Getter`] twice
//! shares one observation with two subscriptions.
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use blixt::{observe, run_frame, Getter};
//!
//! let getter: Getter<i64> = Rc::new({
//!     let s = s.clone();
//!     move || s.get("count").as_f64().unwrap_or(0.0) as i64
//! });
//!
//! let subscription = observe(&getter, |count| println!("count = {count}"));
//!
//! s.set("count", 1)?;
//! run_frame(); // prints "count = 1"
//! ```

pub mod attribute;
pub mod content;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::scheduler::{self, FrameId};
use crate::store::{Callback, StoreState, StoreSubscription, subscribe_state};
use crate::value::Value;

/// A zero-argument function observed for store reads.
pub type Getter<T> = Rc<dyn Fn() -> T>;

/// Store key paths read during one run, keyed by `(state id, key path)`.
type Dependencies = IndexMap<(u64, String), StoreState>;

static NEXT_OBSERVATION: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Recording
// =============================================================================

struct Frame {
    id: u64,
    reads: Dependencies,
}

thread_local! {
    /// Recordings of every run in flight, innermost last.
    static RECORDING: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };

    /// Live observations by getter address.
    static OBSERVATIONS: RefCell<HashMap<usize, Weak<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Record a read of `key` against every running observation.
pub(crate) fn observe_key(state: &StoreState, key: &str) {
    RECORDING.with(|frames| {
        for frame in frames.borrow_mut().iter_mut() {
            frame
                .reads
                .entry((state.id(), key.to_string()))
                .or_insert_with(|| state.clone());
        }
    });
}

/// Pushes a recording frame; pops it on `finish` or on drop.
struct Recording {
    id: u64,
}

impl Recording {
    fn start(id: u64) -> Self {
        RECORDING.with(|frames| {
            frames.borrow_mut().push(Frame {
                id,
                reads: Dependencies::new(),
            })
        });
        Self { id }
    }

    fn finish(self) -> Dependencies {
        let reads = RECORDING.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames
                .iter()
                .rposition(|frame| frame.id == self.id)
                .map(|index| frames.remove(index).reads)
                .unwrap_or_default()
        });
        // Already popped; the drop cleanup is for unwinding only.
        std::mem::forget(self);
        reads
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        let _ = RECORDING.try_with(|frames| {
            let mut frames = frames.borrow_mut();
            if let Some(index) = frames.iter().rposition(|frame| frame.id == self.id) {
                frames.remove(index);
            }
        });
    }
}

/// Whether any observation is recording reads right now.
pub fn is_recording() -> bool {
    RECORDING.with(|frames| !frames.borrow().is_empty())
}

/// Run `f` without recording its reads against any running observation.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let hidden = RECORDING.with(|frames| std::mem::take(&mut *frames.borrow_mut()));
    let result = f();
    RECORDING.with(|frames| {
        let mut frames = frames.borrow_mut();
        let nested = std::mem::replace(&mut *frames, hidden);
        frames.extend(nested);
    });
    result
}

// =============================================================================
// Observation
// =============================================================================

struct SubscriptionState<T> {
    active: Cell<bool>,
    after: Box<dyn Fn(&T)>,
    stores: RefCell<IndexMap<(u64, String), StoreSubscription>>,
}

struct Observation<T> {
    id: u64,
    address: usize,
    getter: Getter<T>,
    observed: RefCell<Dependencies>,
    subscriptions: RefCell<Vec<Rc<SubscriptionState<T>>>>,
    frame: Cell<Option<FrameId>>,
    this: Weak<Observation<T>>,
}

impl<T: 'static> Observation<T> {
    fn get_or_create(getter: &Getter<T>) -> Rc<Self> {
        let address = Rc::as_ptr(getter) as *const () as usize;

        let existing = OBSERVATIONS.with(|observations| {
            observations
                .borrow()
                .get(&address)
                .and_then(Weak::upgrade)
                .and_then(|any| any.downcast::<Observation<T>>().ok())
        });

        if let Some(observation) = existing {
            return observation;
        }

        let observation = Rc::new_cyclic(|this| Observation {
            id: NEXT_OBSERVATION.fetch_add(1, Ordering::Relaxed),
            address,
            getter: getter.clone(),
            observed: RefCell::new(Dependencies::new()),
            subscriptions: RefCell::new(Vec::new()),
            frame: Cell::new(None),
            this: this.clone(),
        });

        let any: Rc<dyn Any> = observation.clone();
        OBSERVATIONS.with(|observations| {
            observations
                .borrow_mut()
                .insert(address, Rc::downgrade(&any));
        });

        observation
    }

    fn run(&self) {
        let recording = Recording::start(self.id);
        let value = (self.getter)();
        let observed = recording.finish();

        debug!(
            observation = self.id,
            dependencies = observed.len(),
            "observation run"
        );

        let subscriptions: Vec<_> = self.subscriptions.borrow().clone();

        for subscription in subscriptions {
            if !subscription.active.get() {
                continue;
            }
            self.sync(&subscription, &observed);
            (subscription.after)(&value);
        }

        *self.observed.borrow_mut() = observed;
    }

    /// Bring one subscription's store subscriptions in line with `observed`.
    fn sync(&self, subscription: &SubscriptionState<T>, observed: &Dependencies) {
        let mut stores = subscription.stores.borrow_mut();

        stores.retain(|dependency, store| {
            let keep = observed.contains_key(dependency);
            if !keep {
                store.unsubscribe();
            }
            keep
        });

        for (dependency, state) in observed {
            if !stores.contains_key(dependency) {
                let store = subscribe_state(state, dependency.1.clone(), self.requeue());
                stores.insert(dependency.clone(), store);
            }
        }
    }

    fn requeue(&self) -> Callback {
        let this = self.this.clone();
        Rc::new(move |_: &Value, _: &Value, _: Option<&str>| {
            if let Some(observation) = this.upgrade() {
                observation.queue();
            }
        })
    }

    /// Replace any pending re-run with one on the next frame.
    fn queue(&self) {
        if let Some(frame) = self.frame.take() {
            scheduler::cancel_frame(frame);
        }

        let this = self.this.clone();
        let frame = scheduler::request_frame(move || {
            if let Some(observation) = this.upgrade() {
                observation.frame.set(None);
                observation.run();
            }
        });

        trace!(observation = self.id, "observation queued");
        self.frame.set(Some(frame));
    }
}

impl<T> Drop for Observation<T> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            scheduler::cancel_frame(frame);
        }

        let _ = OBSERVATIONS.try_with(|observations| {
            let mut observations = observations.borrow_mut();
            if observations
                .get(&self.address)
                .is_some_and(|weak| weak.strong_count() == 0)
            {
                observations.remove(&self.address);
            }
        });
    }
}

// =============================================================================
// ObservationSubscription
// =============================================================================

trait Pausable {
    fn pause(&self);
    fn resume(&self);
    fn is_active(&self) -> bool;
    fn dependencies(&self) -> Vec<String>;
}

struct Handle<T: 'static> {
    observation: Rc<Observation<T>>,
    state: Rc<SubscriptionState<T>>,
}

impl<T: 'static> Pausable for Handle<T> {
    fn pause(&self) {
        if !self.state.active.replace(false) {
            return;
        }
        for store in self.state.stores.borrow().values() {
            store.unsubscribe();
        }
        trace!(observation = self.observation.id, "observation paused");
    }

    fn resume(&self) {
        if self.state.active.replace(true) {
            return;
        }
        for store in self.state.stores.borrow().values() {
            store.resubscribe();
        }
        trace!(observation = self.observation.id, "observation resumed");
        self.observation.run();
    }

    fn is_active(&self) -> bool {
        self.state.active.get()
    }

    fn dependencies(&self) -> Vec<String> {
        self.state
            .stores
            .borrow()
            .keys()
            .map(|(_, key)| key.clone())
            .collect()
    }
}

impl<T: 'static> Drop for Handle<T> {
    fn drop(&mut self) {
        for (_, store) in self.state.stores.borrow_mut().drain(..) {
            store.unsubscribe();
        }
        self.observation
            .subscriptions
            .borrow_mut()
            .retain(|state| !Rc::ptr_eq(state, &self.state));
    }
}

/// One registration of an `after` callback on an observation.
///
/// Can be paused with [`unsubscribe`](Self::unsubscribe) and resumed with
/// [`resubscribe`](Self::resubscribe). Dropping the last clone of the handle
/// stops the registration for good.
#[derive(Clone)]
#[must_use = "dropping an ObservationSubscription stops the observation"]
pub struct ObservationSubscription(Rc<dyn Pausable>);

impl ObservationSubscription {
    /// Stop reacting to store changes. No-op while paused.
    pub fn unsubscribe(&self) {
        self.0.pause();
    }

    /// React to store changes again and re-run once right away.
    /// No-op while active.
    pub fn resubscribe(&self) {
        self.0.resume();
    }

    pub fn is_active(&self) -> bool {
        self.0.is_active()
    }

    /// Key paths this subscription currently listens to.
    pub fn dependencies(&self) -> Vec<String> {
        self.0.dependencies()
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for ObservationSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationSubscription")
            .field("active", &self.is_active())
            .field("dependencies", &self.dependencies())
            .finish()
    }
}

/// Wrap a closure as a [`Getter`].
pub fn getter<T, F>(f: F) -> Getter<T>
where
    F: Fn() -> T + 'static,
{
    Rc::new(f)
}

/// Observe the store reads of `getter` and call `after` with its result.
///
/// Runs the getter once right away. Later runs happen on the frame after a
/// dependency changed.
pub fn observe<T, F>(getter: &Getter<T>, after: F) -> ObservationSubscription
where
    T: 'static,
    F: Fn(&T) + 'static,
{
    let observation = Observation::get_or_create(getter);

    let state = Rc::new(SubscriptionState {
        active: Cell::new(true),
        after: Box::new(after),
        stores: RefCell::new(IndexMap::new()),
    });

    observation.subscriptions.borrow_mut().push(state.clone());
    observation.run();

    ObservationSubscription(Rc::new(Handle { observation, state }))
}

/// Reset thread-local observer state (for testing).
pub fn reset_observer_state() {
    RECORDING.with(|frames| frames.borrow_mut().clear());
    OBSERVATIONS.with(|observations| observations.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{has_pending_frame, reset_frames, run_frame};
    use crate::store::Store;
    use serde_json::json;

    fn setup() {
        reset_frames();
        reset_observer_state();
    }

    fn counting(store: &Store, path: &'static str) -> (Getter<Value>, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let (s, r) = (store.clone(), runs.clone());
        let getter = getter(move || {
            r.set(r.get() + 1);
            s.get(path)
        });
        (getter, runs)
    }

    #[test]
    fn test_one_rerun_per_frame() {
        setup();
        let s = Store::new(json!({ "a": { "b": 1 } })).unwrap();
        let (getter, runs) = counting(&s, "a.b");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = observe(&getter, move |value: &Value| sink.borrow_mut().push(value.clone()));
        assert_eq!(runs.get(), 1);

        s.set("a.b", 2).unwrap();
        s.set("a.b", 3).unwrap();
        s.set("a.b", 4).unwrap();
        assert_eq!(runs.get(), 1);
        assert!(has_pending_frame());

        assert_eq!(run_frame(), 1);
        assert_eq!(runs.get(), 2);
        assert_eq!(*seen.borrow(), vec![Value::Number(1.0), Value::Number(4.0)]);
    }

    #[test]
    fn test_records_every_segment() {
        setup();
        let s = Store::new(json!({ "a": { "b": 1 } })).unwrap();
        let (getter, _) = counting(&s, "a.b");
        let sub = observe(&getter, |_| {});
        assert_eq!(sub.dependencies(), vec!["a", "a.b"]);

        // Replacing the parent object reaches the observation too.
        s.set("a", json!({ "b": 5 })).unwrap();
        assert!(has_pending_frame());
    }

    #[test]
    fn test_dependencies_follow_the_latest_run() {
        setup();
        let s = Store::new(json!({ "flag": true, "x": 1, "y": 2 })).unwrap();
        let reader = s.clone();
        let getter = getter(move || {
            if reader.get("flag") == Value::Bool(true) {
                reader.get("x")
            } else {
                reader.get("y")
            }
        });

        let sub = observe(&getter, |_| {});
        assert_eq!(sub.dependencies(), vec!["flag", "x"]);

        s.set("flag", false).unwrap();
        run_frame();
        assert_eq!(sub.dependencies(), vec!["flag", "y"]);

        s.set("x", 10).unwrap();
        assert!(!has_pending_frame());
    }

    #[test]
    fn test_unsubscribe_and_resubscribe() {
        setup();
        let s = Store::new(json!({ "count": 0 })).unwrap();
        let (getter, _) = counting(&s, "count");
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let sub = observe(&getter, move |_| c.set(c.get() + 1));
        assert_eq!(calls.get(), 1);

        sub.unsubscribe();
        assert!(!sub.is_active());
        s.set("count", 1).unwrap();
        run_frame();
        assert_eq!(calls.get(), 1);

        sub.resubscribe();
        assert_eq!(calls.get(), 2);

        s.set("count", 2).unwrap();
        run_frame();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_same_getter_shares_one_observation() {
        setup();
        let s = Store::new(json!({ "count": 0 })).unwrap();
        let (getter, runs) = counting(&s, "count");
        let calls = Rc::new(Cell::new(0));

        let c = calls.clone();
        let first = observe(&getter, move |_| c.set(c.get() + 1));
        let c = calls.clone();
        let _second = observe(&getter, move |_| c.set(c.get() + 1));

        // The second observe re-runs, and both callbacks see it.
        assert_eq!(runs.get(), 2);
        assert_eq!(calls.get(), 3);

        s.set("count", 1).unwrap();
        run_frame();
        assert_eq!(runs.get(), 3);
        assert_eq!(calls.get(), 5);

        first.unsubscribe();
        s.set("count", 2).unwrap();
        run_frame();
        assert_eq!(calls.get(), 6);
    }

    #[test]
    fn test_dropping_the_handle_unsubscribes() {
        setup();
        let s = Store::new(json!({ "count": 0 })).unwrap();
        let (getter, runs) = counting(&s, "count");
        let sub = observe(&getter, |_| {});
        assert_eq!(s.state().subscribed_keys(), 1);

        drop(sub);
        assert_eq!(s.state().subscribed_keys(), 0);

        s.set("count", 1).unwrap();
        run_frame();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_nested_recordings_both_see_reads() {
        setup();
        let s = Store::new(json!({ "x": 1 })).unwrap();

        let outer = Recording::start(1000);
        let inner = Recording::start(1001);
        s.get("x");
        let inner_reads = inner.finish();
        s.get("missing");
        let outer_reads = outer.finish();

        assert_eq!(inner_reads.len(), 1);
        assert_eq!(outer_reads.len(), 2);
        assert!(!is_recording());
    }

    #[test]
    fn test_reentrant_recording_keeps_outer_frame() {
        setup();
        let s = Store::new(json!({ "x": 1, "y": 2 })).unwrap();

        let outer = Recording::start(2000);
        s.get("x");
        let inner = Recording::start(2000);
        s.get("y");
        let inner_reads = inner.finish();
        assert!(is_recording());

        let outer_reads = outer.finish();
        assert_eq!(inner_reads.len(), 1);
        assert_eq!(outer_reads.len(), 2);
        assert!(!is_recording());
    }

    #[test]
    fn test_untracked_reads_are_hidden() {
        setup();
        let s = Store::new(json!({ "x": 1, "y": 2 })).unwrap();
        let reader = s.clone();
        let getter = getter(move || {
            let x = reader.get("x");
            untracked(|| reader.get("y"));
            x
        });
        let sub = observe(&getter, |_| {});
        assert_eq!(sub.dependencies(), vec!["x"]);
    }

    #[test]
    fn test_callback_writing_its_own_dependency_settles() {
        setup();
        crate::config::set_settle_limit(4);
        let s = Store::new(json!({ "n": 0 })).unwrap();
        let (getter, runs) = counting(&s, "n");
        let writer = s.clone();
        let _sub = observe(&getter, move |value: &Value| {
            let next = value.as_f64().unwrap_or(0.0) + 1.0;
            writer.set("n", next).unwrap();
        });

        // One pending re-run at a time, however often it requeues.
        assert_eq!(crate::scheduler::pending_frames(), 1);
        assert_eq!(crate::scheduler::settle(), 4);
        assert_eq!(runs.get(), 5);
        crate::config::reset_options();
        reset_frames();
    }
}
