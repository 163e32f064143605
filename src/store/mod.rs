//! Reactive Store - Tracked reads and notifying writes over nested data.
//!
//! A store wraps a plain object or array. Every nested object and array is
//! turned into a child store that shares the root's [`StoreState`], so one
//! subscription registry serves the whole graph and every node knows its key
//! path from the root.
//!
//! Reads go through [`Store::get`], which records the key path against any
//! running observation. Writes go through [`Store::set`] and the array
//! mutators, which notify subscribers of the changed key paths and of every
//! ancestor path.
//!
//! # Example
//!
//! ```ignore
//! use blixt::{store, subscribe};
//! use serde_json::json;
//!
//! let s = store(json!({ "nested": { "key": 1 } }))?;
//!
//! subscribe(&s, "nested", |_, _, origin| {
//!     assert_eq!(origin, Some("nested.key"));
//! })?;
//!
//! s.set("nested.key", 2)?;
//! ```

mod array;
mod emit;
mod subscription;

pub use subscription::{Callback, StoreSubscription, subscribe};

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{Error, Result};
use crate::key::{Key, PERIOD, get_key, parse_index};
use crate::observer;
use crate::value::Value;

pub(crate) use emit::emit;
pub(crate) use subscription::{Subscriber, subscribe_state};

static NEXT_STATE: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// StoreState
// =============================================================================

/// Identity shared by every store of one reactive graph.
///
/// Holds the subscription registry. The registry lives exactly as long as
/// some store (or store subscription handle) of the graph is reachable.
#[derive(Clone)]
pub struct StoreState(pub(crate) Rc<StateInner>);

pub(crate) struct StateInner {
    pub(crate) id: u64,
    root: RefCell<Weak<RefCell<Node>>>,
    pub(crate) registry: RefCell<IndexMap<String, Vec<Subscriber>>>,
}

impl StoreState {
    fn new() -> Self {
        Self(Rc::new(StateInner {
            id: NEXT_STATE.fetch_add(1, Ordering::Relaxed),
            root: RefCell::new(Weak::new()),
            registry: RefCell::new(IndexMap::new()),
        }))
    }

    /// Unique id of this graph.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// The root store of this graph, if it is still alive.
    pub fn root(&self) -> Option<Store> {
        let node = self.0.root.borrow().upgrade()?;
        Some(Store {
            state: self.clone(),
            node,
        })
    }

    /// Number of keys with at least one subscriber.
    pub fn subscribed_keys(&self) -> usize {
        self.0.registry.borrow().len()
    }

    pub(crate) fn downgrade(&self) -> Weak<StateInner> {
        Rc::downgrade(&self.0)
    }
}

impl PartialEq for StoreState {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for StoreState {}

impl fmt::Debug for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreState({})", self.0.id)
    }
}

// =============================================================================
// Store
// =============================================================================

pub(crate) struct Node {
    prefix: Option<String>,
    data: Data,
}

pub(crate) enum Data {
    Object(IndexMap<String, Value>),
    Array(Vec<Value>),
}

/// A reactive handle to one object or array of a graph.
///
/// Cloning a `Store` clones the handle, not the data.
#[derive(Clone)]
pub struct Store {
    state: StoreState,
    node: Rc<RefCell<Node>>,
}

/// Wrap plain data in a reactive store.
///
/// Maps and lists are accepted. A value that already is a store is returned
/// unchanged, so `store(store(d))` is the same handle as `store(d)`.
pub fn store(data: impl Into<Value>) -> Result<Store> {
    match data.into() {
        Value::Store(existing) => Ok(existing),
        value @ (Value::Map(_) | Value::List(_)) => {
            let state = StoreState::new();
            let Value::Store(root) = wrap(&state, None, value) else {
                return Err(Error::InvalidData("unknown"));
            };
            *state.0.root.borrow_mut() = Rc::downgrade(&root.node);
            trace!(state = state.id(), "store created");
            Ok(root)
        }
        other => Err(Error::InvalidData(other.type_name())),
    }
}

/// Turn a value into what a store keeps at `prefix`.
///
/// Objects and arrays become child stores sharing `state`. A store from
/// anywhere else is copied, since one node has exactly one key path.
pub(crate) fn wrap(state: &StoreState, prefix: Option<String>, value: Value) -> Value {
    let data = match value {
        Value::Map(entries) => Data::Object(
            entries
                .into_iter()
                .map(|(key, item)| {
                    let path = get_key([prefix.as_deref().unwrap_or(""), key.as_str()]);
                    (key, wrap(state, Some(path), item))
                })
                .collect(),
        ),
        Value::List(items) => Data::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    let index = index.to_string();
                    let path = get_key([prefix.as_deref().unwrap_or(""), index.as_str()]);
                    wrap(state, Some(path), item)
                })
                .collect(),
        ),
        Value::Store(existing) => return wrap(state, prefix, existing.to_plain()),
        scalar => return scalar,
    };

    Value::Store(Store {
        state: state.clone(),
        node: Rc::new(RefCell::new(Node {
            prefix: prefix.filter(|p| !p.is_empty()),
            data,
        })),
    })
}

impl Store {
    /// Wrap JSON data in a reactive store.
    pub fn new(data: serde_json::Value) -> Result<Self> {
        store(Value::from(data))
    }

    /// The graph this store belongs to.
    pub fn state(&self) -> &StoreState {
        &self.state
    }

    /// Key path of this store from the root. `None` for the root itself.
    pub fn prefix(&self) -> Option<String> {
        self.node.borrow().prefix.clone()
    }

    pub fn is_array(&self) -> bool {
        matches!(self.node.borrow().data, Data::Array(_))
    }

    /// Whether both handles point at the same store.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a value, recording each path segment against running observations.
    ///
    /// `get("a.b")` behaves like reading `a` on this store, then `b` on the
    /// child, so both `a` and `a.b` are recorded. Missing keys read as `Null`.
    pub fn get(&self, path: impl Into<Key>) -> Value {
        let path = path.into().to_string();
        let mut current = self.clone();
        let mut segments = path.split(PERIOD).peekable();

        while let Some(segment) = segments.next() {
            current.track(segment);
            let value = current.child(segment);

            if segments.peek().is_none() {
                return value;
            }

            match value {
                Value::Store(next) => current = next,
                _ => return Value::Null,
            }
        }

        Value::Null
    }

    /// Read a nested value without recording anything.
    pub fn peek(&self, path: &str) -> Value {
        crate::key::get_value(&Value::Store(self.clone()), path)
    }

    /// Length of an array (or number of keys of an object). Tracked as `length`.
    pub fn len(&self) -> usize {
        self.track("length");
        self.len_untracked()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry in order, each one a tracked read.
    pub fn values(&self) -> Vec<Value> {
        if self.is_array() {
            self.track("length");
        }
        self.keys().into_iter().map(|key| self.get(key)).collect()
    }

    /// Keys in order (indices for arrays). Untracked.
    pub fn keys(&self) -> Vec<String> {
        match &self.node.borrow().data {
            Data::Object(entries) => entries.keys().cloned().collect(),
            Data::Array(items) => (0..items.len()).map(|index| index.to_string()).collect(),
        }
    }

    /// Untracked JSON snapshot.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_plain().to_json()
    }

    /// Untracked plain copy.
    pub fn to_plain(&self) -> Value {
        match &self.node.borrow().data {
            Data::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_plain()))
                    .collect(),
            ),
            Data::Array(items) => Value::List(items.iter().map(Value::to_plain).collect()),
        }
    }

    pub(crate) fn len_untracked(&self) -> usize {
        match &self.node.borrow().data {
            Data::Object(entries) => entries.len(),
            Data::Array(items) => items.len(),
        }
    }

    /// Raw lookup of one segment.
    pub(crate) fn child(&self, segment: &str) -> Value {
        match &self.node.borrow().data {
            Data::Object(entries) => entries.get(segment).cloned().unwrap_or_default(),
            Data::Array(items) if segment == "length" => Value::from(items.len()),
            Data::Array(items) => parse_index(segment)
                .and_then(|index| items.get(index).cloned())
                .unwrap_or_default(),
        }
    }

    pub(crate) fn child_path(&self, segment: &str) -> String {
        let node = self.node.borrow();
        get_key([node.prefix.as_deref().unwrap_or(""), segment])
    }

    fn track(&self, segment: &str) {
        observer::observe_key(&self.state, &self.child_path(segment));
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a value and notify subscribers.
    ///
    /// Intermediate segments of a dotted path must lead to stores, otherwise
    /// `Error::InvalidPath` is returned. `Ok(false)` means the assignment was
    /// impossible (a non-index key on an array) and nothing was notified.
    pub fn set(&self, path: impl Into<Key>, value: impl Into<Value>) -> Result<bool> {
        let path = path.into().to_string();

        let (target, key) = match path.rsplit_once(PERIOD) {
            Some((head, key)) => match self.get(head) {
                Value::Store(target) => (target, key.to_string()),
                _ => return Err(Error::InvalidPath(head.to_string())),
            },
            None => (self.clone(), path),
        };

        Ok(target.assign(&key, value.into()))
    }

    fn assign(&self, key: &str, value: Value) -> bool {
        let prefix = self.prefix();

        if key == "length" && self.is_array() {
            return self.truncate(value);
        }

        let new_value = wrap(&self.state, Some(self.child_path(key)), value);

        let old_value = {
            let mut node = self.node.borrow_mut();
            match &mut node.data {
                Data::Object(entries) => entries
                    .insert(key.to_string(), new_value.clone())
                    .unwrap_or_default(),
                Data::Array(items) => {
                    let Some(index) = parse_index(key) else {
                        return false;
                    };
                    if index >= items.len() {
                        items.resize(index + 1, Value::Null);
                    }
                    std::mem::replace(&mut items[index], new_value.clone())
                }
            }
        };

        match &old_value {
            Value::Store(old) => {
                let (properties, old_values) = old.diff(&new_value);
                emit(
                    self,
                    Some(&self.child_path(key)),
                    &properties,
                    old_values,
                );
            }
            _ => emit(
                self,
                prefix.as_deref(),
                &[key.to_string()],
                vec![old_value],
            ),
        }

        true
    }

    /// Shallow structural diff against whatever replaced this store.
    ///
    /// Keys whose values differ (or vanished) come first with their old
    /// values, then keys that are new.
    fn diff(&self, replacement: &Value) -> (Vec<String>, Vec<Value>) {
        let next = replacement.as_store();
        let mut properties = Vec::new();
        let mut old_values = Vec::new();

        for key in self.keys() {
            let before = self.child(&key);
            let after = next.map(|store| store.child(&key)).unwrap_or_default();
            if before != after {
                properties.push(key);
                old_values.push(before);
            }
        }

        if let Some(next) = next {
            let known = self.keys();
            properties.extend(next.keys().into_iter().filter(|key| !known.contains(key)));
        }

        (properties, old_values)
    }

    /// Move this store (and its children) to a new key path.
    pub(crate) fn relocate(&self, prefix: String) {
        let children: Vec<(String, Store)> = {
            let mut node = self.node.borrow_mut();
            if node.prefix.as_deref() == Some(prefix.as_str()) {
                return;
            }
            node.prefix = Some(prefix.clone());
            let entries: Vec<(String, &Value)> = match &node.data {
                Data::Object(entries) => entries.iter().map(|(k, v)| (k.clone(), v)).collect(),
                Data::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(index, v)| (index.to_string(), v))
                    .collect(),
            };
            entries
                .into_iter()
                .filter_map(|(key, value)| value.as_store().map(|s| (key, s.clone())))
                .collect()
        };

        for (key, child) in children {
            child.relocate(get_key([prefix.as_str(), key.as_str()]));
        }
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Store");
        debug.field("state", &self.state.id());
        match self.node.try_borrow() {
            Ok(node) => debug.field("prefix", &node.prefix),
            Err(_) => debug.field("prefix", &"<borrowed>"),
        };
        debug.finish_non_exhaustive()
    }
}
