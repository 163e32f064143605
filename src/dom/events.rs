//! Event listeners and dispatch.
//!
//! Listeners are kept in a thread-local registry keyed by node, each with
//! an id for removal (the same shape as a keyboard handler registry).
//! Dispatch walks capture, target and bubble phases over the node's
//! ancestors.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use bitflags::bitflags;
use tracing::trace;

use super::{NodeId, parent};

bitflags! {
    /// Listener options, as parsed from `@event:modifier` attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ListenerOptions: u8 {
        const CAPTURE = 1 << 0;
        const ONCE = 1 << 1;
        const PASSIVE = 1 << 2;
    }
}

impl Default for ListenerOptions {
    fn default() -> Self {
        ListenerOptions::PASSIVE
    }
}

/// Listener callback.
pub type Listener = Rc<dyn Fn(&Event)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event name and options encoded in an event attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventParameters {
    pub name: String,
    pub options: ListenerOptions,
}

/// Parse `@name[:modifier...]`.
///
/// Listeners are passive unless the `active` modifier is given; `capture`
/// and `once` set their flags. Modifiers are case-insensitive.
pub fn get_event_parameters(attribute: &str) -> EventParameters {
    let name = attribute.strip_prefix('@').unwrap_or(attribute);

    let Some((name, modifiers)) = name.split_once(':') else {
        return EventParameters {
            name: name.to_string(),
            options: ListenerOptions::PASSIVE,
        };
    };

    let modifiers: Vec<String> = modifiers
        .split(':')
        .map(|modifier| modifier.to_ascii_lowercase())
        .collect();
    let has = |flag: &str| modifiers.iter().any(|modifier| modifier == flag);

    let mut options = ListenerOptions::empty();
    options.set(ListenerOptions::CAPTURE, has("capture"));
    options.set(ListenerOptions::ONCE, has("once"));
    options.set(ListenerOptions::PASSIVE, !has("active"));

    EventParameters {
        name: name.to_string(),
        options,
    }
}

// =============================================================================
// Event
// =============================================================================

/// A dispatched event.
#[derive(Debug)]
pub struct Event {
    kind: String,
    bubbles: bool,
    target: Cell<Option<NodeId>>,
    current_target: Cell<Option<NodeId>>,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
    in_passive_listener: Cell<bool>,
}

impl Event {
    /// A bubbling event of the given type.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            bubbles: true,
            target: Cell::new(None),
            current_target: Cell::new(None),
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
            in_passive_listener: Cell::new(false),
        }
    }

    pub fn non_bubbling(kind: impl Into<String>) -> Self {
        Self {
            bubbles: false,
            ..Self::new(kind)
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn target(&self) -> Option<NodeId> {
        self.target.get()
    }

    pub fn current_target(&self) -> Option<NodeId> {
        self.current_target.get()
    }

    /// Ignored inside passive listeners.
    pub fn prevent_default(&self) {
        if !self.in_passive_listener.get() {
            self.default_prevented.set(true);
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }
}

// =============================================================================
// Registry
// =============================================================================

struct Registered {
    id: ListenerId,
    kind: String,
    options: ListenerOptions,
    callback: Listener,
}

thread_local! {
    static LISTENERS: RefCell<HashMap<NodeId, Vec<Registered>>> = RefCell::new(HashMap::new());
    static NEXT_LISTENER: Cell<u64> = const { Cell::new(1) };
}

pub fn add_event_listener<F>(
    node: NodeId,
    kind: &str,
    options: ListenerOptions,
    callback: F,
) -> ListenerId
where
    F: Fn(&Event) + 'static,
{
    add_listener(node, kind, options, Rc::new(callback))
}

/// Register an already shared callback.
pub fn add_listener(
    node: NodeId,
    kind: &str,
    options: ListenerOptions,
    callback: Listener,
) -> ListenerId {
    let id = NEXT_LISTENER.with(|next| {
        let id = next.get();
        next.set(id + 1);
        ListenerId(id)
    });

    LISTENERS.with(|listeners| {
        listeners.borrow_mut().entry(node).or_default().push(Registered {
            id,
            kind: kind.to_string(),
            options,
            callback,
        });
    });

    trace!(?node, kind, "listener added");
    id
}

/// Remove a listener. Returns false if it was already gone.
pub fn remove_event_listener(node: NodeId, id: ListenerId) -> bool {
    LISTENERS.with(|listeners| {
        let mut listeners = listeners.borrow_mut();
        let Some(registered) = listeners.get_mut(&node) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|listener| listener.id != id);
        let removed = registered.len() != before;
        if registered.is_empty() {
            listeners.remove(&node);
        }
        removed
    })
}

pub fn listener_count(node: NodeId) -> usize {
    LISTENERS.with(|listeners| listeners.borrow().get(&node).map_or(0, Vec::len))
}

pub(crate) fn purge(node: NodeId) {
    LISTENERS.with(|listeners| {
        listeners.borrow_mut().remove(&node);
    });
}

pub(crate) fn reset_events() {
    LISTENERS.with(|listeners| listeners.borrow_mut().clear());
}

// =============================================================================
// Dispatch
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Capture,
    Target,
    Bubble,
}

/// Dispatch `event` at `target`. Returns false if a listener prevented the
/// default action.
pub fn dispatch_event(target: NodeId, event: &Event) -> bool {
    event.target.set(Some(target));

    let mut path = Vec::new();
    let mut current = parent(target);
    while let Some(node) = current {
        path.push(node);
        current = parent(node);
    }

    let phases = path
        .iter()
        .rev()
        .map(|node| (*node, Phase::Capture))
        .chain(std::iter::once((target, Phase::Target)))
        .chain(
            path.iter()
                .filter(|_| event.bubbles)
                .map(|node| (*node, Phase::Bubble)),
        );

    for (node, phase) in phases {
        invoke(node, phase, event);
        if event.propagation_stopped.get() {
            break;
        }
    }

    event.current_target.set(None);
    !event.default_prevented()
}

fn invoke(node: NodeId, phase: Phase, event: &Event) {
    let matching: Vec<(ListenerId, ListenerOptions, Listener)> = LISTENERS.with(|listeners| {
        listeners
            .borrow()
            .get(&node)
            .map(|registered| {
                registered
                    .iter()
                    .filter(|listener| listener.kind == event.kind)
                    .filter(|listener| match phase {
                        Phase::Capture => listener.options.contains(ListenerOptions::CAPTURE),
                        Phase::Target => true,
                        Phase::Bubble => !listener.options.contains(ListenerOptions::CAPTURE),
                    })
                    .map(|listener| (listener.id, listener.options, listener.callback.clone()))
                    .collect()
            })
            .unwrap_or_default()
    });

    event.current_target.set(Some(node));

    for (id, options, callback) in matching {
        if options.contains(ListenerOptions::ONCE) {
            remove_event_listener(node, id);
        }
        event
            .in_passive_listener
            .set(options.contains(ListenerOptions::PASSIVE));
        callback(event);
        event.in_passive_listener.set(false);
    }
}
