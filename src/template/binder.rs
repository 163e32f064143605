//! Binder - Wires a parsed template to its expressions.
//!
//! Walks the rendered fragment in document order. Every sentinel comment
//! takes the next expression as content, and every attribute whose value is
//! the sentinel takes the next expression as an event listener or an
//! observed attribute.
//!
//! Bindings are recorded in thread-local side tables keyed by node:
//!
//! - properties: the attribute getters and listeners installed on a node, so
//!   [`clean_nodes`] can remove them and hydration can install them again
//! - subscriptions: attribute observations owned by a node
//!
//! Rows are purged when the node is released.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};

use super::{Content, Expression, SENTINEL, SENTINEL_DATA};
use crate::dom::events::{self, Listener, ListenerId, ListenerOptions, get_event_parameters};
use crate::dom::{self, NodeId};
use crate::observer::{Getter, ObservationSubscription, attribute, content};

/// A binding installed on a node.
#[derive(Clone)]
pub(crate) enum NodeProperty {
    /// Observed attribute.
    Attribute { name: String, getter: Getter<Content> },
    /// Listener added for an `@event` attribute.
    Event {
        attribute: String,
        listener: Listener,
        id: ListenerId,
        options: ListenerOptions,
    },
}

thread_local! {
    static NODE_PROPERTIES: RefCell<HashMap<NodeId, Vec<NodeProperty>>> =
        RefCell::new(HashMap::new());
    static NODE_SUBSCRIPTIONS: RefCell<HashMap<NodeId, Vec<ObservationSubscription>>> =
        RefCell::new(HashMap::new());
}

// =============================================================================
// Side tables
// =============================================================================

fn purge_on_release(node: NodeId) {
    dom::on_release(node, move || {
        NODE_PROPERTIES.with(|properties| properties.borrow_mut().remove(&node));
        let subscriptions =
            NODE_SUBSCRIPTIONS.with(|subscriptions| subscriptions.borrow_mut().remove(&node));
        drop(subscriptions);
    });
}

pub(crate) fn store_property(node: NodeId, property: NodeProperty) {
    let first = NODE_PROPERTIES.with(|properties| {
        let mut properties = properties.borrow_mut();
        let first = !properties.contains_key(&node);
        properties.entry(node).or_default().push(property);
        first
    });
    if first {
        purge_on_release(node);
    }
}

pub(crate) fn store_subscription(node: NodeId, subscription: ObservationSubscription) {
    let first = NODE_SUBSCRIPTIONS.with(|subscriptions| {
        let mut subscriptions = subscriptions.borrow_mut();
        let first = !subscriptions.contains_key(&node);
        let stored = subscriptions.entry(node).or_default();
        if !stored.iter().any(|existing| existing.ptr_eq(&subscription)) {
            stored.push(subscription);
        }
        first
    });
    if first {
        purge_on_release(node);
    }
}

pub(crate) fn properties(node: NodeId) -> Vec<NodeProperty> {
    NODE_PROPERTIES.with(|properties| properties.borrow().get(&node).cloned().unwrap_or_default())
}

/// Attribute observations owned by `node`.
pub fn subscriptions(node: NodeId) -> Vec<ObservationSubscription> {
    NODE_SUBSCRIPTIONS.with(|subscriptions| {
        subscriptions
            .borrow()
            .get(&node)
            .cloned()
            .unwrap_or_default()
    })
}

/// Remove the listeners recorded for `node`.
fn remove_events(node: NodeId) {
    NODE_PROPERTIES.with(|properties| {
        let mut properties = properties.borrow_mut();
        let Some(stored) = properties.get_mut(&node) else {
            return;
        };
        stored.retain(|property| match property {
            NodeProperty::Event { id, .. } => {
                events::remove_event_listener(node, *id);
                false
            }
            NodeProperty::Attribute { .. } => true,
        });
        if stored.is_empty() {
            properties.remove(&node);
        }
    });
}

/// Tear down bindings in `nodes` and their subtrees.
///
/// Listeners added by the binder are removed and stored properties are
/// forgotten. With `remove_subscriptions`, attribute observations are
/// stopped and content slots inside the subtrees stop updating.
pub fn clean_nodes(nodes: &[NodeId], remove_subscriptions: bool) {
    let mut visited = HashSet::new();

    for node in nodes {
        for node in dom::descendants(*node) {
            remove_events(node);
            NODE_PROPERTIES.with(|properties| properties.borrow_mut().remove(&node));

            if remove_subscriptions {
                let removed = NODE_SUBSCRIPTIONS
                    .with(|subscriptions| subscriptions.borrow_mut().remove(&node));
                for subscription in removed.into_iter().flatten() {
                    subscription.unsubscribe();
                }
            }

            visited.insert(node);
        }
    }

    if remove_subscriptions {
        content::forget(&visited);
    }
}

/// Drop every side table row (for testing).
pub fn reset_bindings() {
    NODE_PROPERTIES.with(|properties| properties.borrow_mut().clear());
    NODE_SUBSCRIPTIONS.with(|subscriptions| subscriptions.borrow_mut().clear());
    content::reset_content();
}

// =============================================================================
// Binding
// =============================================================================

/// Bind the sentinels under `root` to `expressions`, in document order.
pub(crate) fn bind(root: NodeId, expressions: Vec<Expression>) {
    let mut expressions = expressions.into_iter();
    map_nodes(root, &mut expressions);
}

fn map_nodes(node: NodeId, expressions: &mut impl Iterator<Item = Expression>) {
    for child in dom::children(node) {
        if dom::is_comment(child) && dom::data(child).as_deref() == Some(SENTINEL_DATA) {
            set_node(child, expressions.next());
            continue;
        }

        if dom::is_element(child) {
            map_attributes(child, expressions);
        }

        if dom::first_child(child).is_some() {
            map_nodes(child, expressions);
        }
    }
}

/// Put an expression where its sentinel comment is.
fn set_node(comment: NodeId, expression: Option<Expression>) {
    match expression {
        Some(Expression::Reactive(getter)) => content::observe_content(comment, &getter),
        Some(Expression::Node(node)) => {
            dom::replace_with(comment, &[node]);
            dom::release_node(comment);
        }
        Some(Expression::Template(template)) => {
            let fragment = template.render(None);
            dom::replace_with(comment, &[fragment]);
            dom::release_node(fragment);
            dom::release_node(comment);
        }
        Some(Expression::Text(text)) => {
            dom::replace_with(comment, &[dom::create_text(&text)]);
            dom::release_node(comment);
        }
        Some(Expression::List(items)) => {
            for item in items {
                let marker = dom::create_comment(SENTINEL_DATA);
                dom::before(comment, &[marker]);
                set_node(marker, Some(item));
            }
            dom::release_node(comment);
        }
        Some(Expression::Listener(_)) | None => {
            debug!("sentinel without content expression");
            dom::release_node(comment);
        }
    }
}

fn bad_attribute_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)^on").expect("Invalid regex pattern"),
            Regex::new(r"(?i)^(href|src|xlink:href)$").expect("Invalid regex pattern"),
            Regex::new(r"(?i)(data:text/html|javascript:)").expect("Invalid regex pattern"),
        ]
    })
}

/// Inline handlers and script URLs are never rendered.
pub(crate) fn is_bad_attribute(name: &str, value: &str) -> bool {
    let [handler, source, script] = bad_attribute_patterns();
    handler.is_match(name) || (source.is_match(name) && script.is_match(value))
}

fn map_attributes(element: NodeId, expressions: &mut impl Iterator<Item = Expression>) {
    for (name, value) in dom::attributes(element) {
        let expression = if value == SENTINEL { expressions.next() } else { None };

        if is_bad_attribute(&name, &value) {
            debug!(attribute = %name, "removed unsafe attribute");
            dom::remove_attribute(element, &name);
            continue;
        }

        match expression {
            None => {}
            Some(Expression::Listener(listener)) if name.starts_with('@') => {
                add_event(element, &name, listener);
            }
            Some(Expression::Reactive(getter)) if !name.starts_with('@') => {
                observe_attribute(element, &name, getter);
            }
            Some(_) => {
                debug!(attribute = %name, "attribute expression has the wrong kind");
                dom::remove_attribute(element, &name);
            }
        }
    }
}

/// Add the listener for an `@event[:modifier]` attribute and drop the
/// attribute.
pub(crate) fn add_event(element: NodeId, attribute: &str, listener: Listener) {
    let parameters = get_event_parameters(attribute);
    let id = events::add_listener(element, &parameters.name, parameters.options, listener.clone());
    dom::remove_attribute(element, attribute);

    trace!(?element, event = %parameters.name, "event bound");
    store_property(
        element,
        NodeProperty::Event {
            attribute: attribute.to_string(),
            listener,
            id,
            options: parameters.options,
        },
    );
}

pub(crate) fn observe_attribute(element: NodeId, name: &str, getter: Getter<Content>) {
    if let Some(subscription) = attribute::observe_attribute(element, name, &getter) {
        store_property(
            element,
            NodeProperty::Attribute {
                name: name.to_string(),
                getter,
            },
        );
        store_subscription(element, subscription);
    }
}
