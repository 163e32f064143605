//! Host Document - An in-memory DOM kept in a thread-local arena.
//!
//! Nodes are addressed by generational [`NodeId`] handles. Releasing a node
//! frees its slot and bumps the generation, so stale handles read as
//! missing instead of aliasing a new node. Every operation on a missing
//! node is a no-op.
//!
//! Side tables owned by other layers register [`on_release`] callbacks to
//! purge their rows when a node is freed.
//!
//! # Example
//!
//! ```ignore
//! use blixt::dom;
//!
//! let list = dom::create_element("ul");
//! let item = dom::create_element("li");
//! dom::append_child(item, dom::create_text("one"));
//! dom::append_child(list, item);
//!
//! assert_eq!(dom::outer_html(list), "<ul><li>one</li></ul>");
//! ```

pub mod events;
pub mod parser;

pub use events::{
    Event, ListenerId, ListenerOptions, add_event_listener, dispatch_event, remove_event_listener,
};
pub use parser::parse_fragment;

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;

/// Elements that never have children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Handle to a node of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
    Fragment,
}

// =============================================================================
// Arena
// =============================================================================

struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    payload: Payload,
}

#[derive(Clone)]
enum Payload {
    Element(Element),
    Text(String),
    Comment(String),
    Fragment,
}

#[derive(Clone)]
struct Element {
    tag: String,
    attributes: IndexMap<String, String>,
    /// Boolean DOM properties that were set directly.
    properties: IndexMap<String, bool>,
    /// Live `value` property, once assigned.
    value: Option<String>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Default)]
struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Document {
    fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn allocate(&mut self, payload: Payload) -> NodeId {
        let node = Node {
            parent: None,
            children: Vec::new(),
            payload,
        };
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn free(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation && slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                self.live -= 1;
            }
        }
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.get(id).and_then(|node| node.parent) else {
            return;
        };
        if let Some(parent) = self.get_mut(parent) {
            parent.children.retain(|child| *child != id);
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = None;
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.get_mut(id)?.payload {
            Payload::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.get(id)?.payload {
            Payload::Element(element) => Some(element),
            _ => None,
        }
    }
}

thread_local! {
    static DOCUMENT: RefCell<Document> = RefCell::new(Document::default());

    /// Callbacks to run when a node is released.
    static RELEASE_CALLBACKS: RefCell<HashMap<NodeId, Vec<Box<dyn FnOnce()>>>> =
        RefCell::new(HashMap::new());
}

fn with_doc<R>(f: impl FnOnce(&Document) -> R) -> R {
    DOCUMENT.with(|doc| f(&doc.borrow()))
}

fn with_doc_mut<R>(f: impl FnOnce(&mut Document) -> R) -> R {
    DOCUMENT.with(|doc| f(&mut doc.borrow_mut()))
}

// =============================================================================
// Creation & Release
// =============================================================================

pub fn create_element(tag: &str) -> NodeId {
    with_doc_mut(|doc| {
        doc.allocate(Payload::Element(Element {
            tag: tag.to_ascii_lowercase(),
            attributes: IndexMap::new(),
            properties: IndexMap::new(),
            value: None,
        }))
    })
}

pub fn create_text(data: &str) -> NodeId {
    with_doc_mut(|doc| doc.allocate(Payload::Text(data.to_string())))
}

pub fn create_comment(data: &str) -> NodeId {
    with_doc_mut(|doc| doc.allocate(Payload::Comment(data.to_string())))
}

pub fn create_fragment() -> NodeId {
    with_doc_mut(|doc| doc.allocate(Payload::Fragment))
}

/// Run `callback` when `id` is released.
pub fn on_release<F>(id: NodeId, callback: F)
where
    F: FnOnce() + 'static,
{
    if !exists(id) {
        return;
    }
    RELEASE_CALLBACKS.with(|callbacks| {
        callbacks
            .borrow_mut()
            .entry(id)
            .or_default()
            .push(Box::new(callback));
    });
}

/// Detach `id` and free it with its whole subtree.
///
/// Release callbacks and event listeners of every freed node run or are
/// dropped first, while the nodes can still be inspected.
pub fn release_node(id: NodeId) {
    if !exists(id) {
        return;
    }
    remove(id);

    let subtree = descendants(id);

    for node in &subtree {
        let callbacks = RELEASE_CALLBACKS.with(|callbacks| callbacks.borrow_mut().remove(node));
        for callback in callbacks.into_iter().flatten() {
            callback();
        }
        events::purge(*node);
    }

    with_doc_mut(|doc| {
        for node in subtree {
            doc.free(node);
        }
    });
}

/// Free every node and callback (for testing).
pub fn reset_dom() {
    DOCUMENT.with(|doc| *doc.borrow_mut() = Document::default());
    RELEASE_CALLBACKS.with(|callbacks| callbacks.borrow_mut().clear());
    events::reset_events();
}

/// Number of live nodes.
pub fn node_count() -> usize {
    with_doc(|doc| doc.live)
}

// =============================================================================
// Queries
// =============================================================================

pub fn exists(id: NodeId) -> bool {
    with_doc(|doc| doc.get(id).is_some())
}

pub fn kind(id: NodeId) -> Option<NodeKind> {
    with_doc(|doc| {
        doc.get(id).map(|node| match node.payload {
            Payload::Element(_) => NodeKind::Element,
            Payload::Text(_) => NodeKind::Text,
            Payload::Comment(_) => NodeKind::Comment,
            Payload::Fragment => NodeKind::Fragment,
        })
    })
}

pub fn is_element(id: NodeId) -> bool {
    kind(id) == Some(NodeKind::Element)
}

pub fn is_text(id: NodeId) -> bool {
    kind(id) == Some(NodeKind::Text)
}

pub fn is_comment(id: NodeId) -> bool {
    kind(id) == Some(NodeKind::Comment)
}

/// Lower-case tag name of an element.
pub fn tag_name(id: NodeId) -> Option<String> {
    with_doc(|doc| doc.element(id).map(|element| element.tag.clone()))
}

pub fn parent(id: NodeId) -> Option<NodeId> {
    with_doc(|doc| doc.get(id).and_then(|node| node.parent))
}

pub fn children(id: NodeId) -> Vec<NodeId> {
    with_doc(|doc| doc.get(id).map(|node| node.children.clone()).unwrap_or_default())
}

pub fn first_child(id: NodeId) -> Option<NodeId> {
    with_doc(|doc| doc.get(id).and_then(|node| node.children.first().copied()))
}

pub fn next_sibling(id: NodeId) -> Option<NodeId> {
    sibling(id, 1)
}

pub fn previous_sibling(id: NodeId) -> Option<NodeId> {
    sibling(id, -1)
}

fn sibling(id: NodeId, offset: isize) -> Option<NodeId> {
    with_doc(|doc| {
        let parent = doc.get(doc.get(id)?.parent?)?;
        let position = parent.children.iter().position(|child| *child == id)?;
        parent
            .children
            .get(position.checked_add_signed(offset)?)
            .copied()
    })
}

/// `id` and every node below it, in document order.
pub fn descendants(id: NodeId) -> Vec<NodeId> {
    with_doc(|doc| {
        let mut nodes = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = doc.get(current) else {
                continue;
            };
            nodes.push(current);
            stack.extend(node.children.iter().rev());
        }
        nodes
    })
}

/// Whether `other` is `id` or lies below it.
pub fn contains(id: NodeId, other: NodeId) -> bool {
    let mut current = Some(other);
    while let Some(node) = current {
        if node == id {
            return true;
        }
        current = parent(node);
    }
    false
}

/// Character data of a text or comment node.
pub fn data(id: NodeId) -> Option<String> {
    with_doc(|doc| match &doc.get(id)?.payload {
        Payload::Text(data) | Payload::Comment(data) => Some(data.clone()),
        _ => None,
    })
}

/// Text of a node: its data for text and comments, the concatenated text
/// descendants for elements and fragments.
pub fn text_content(id: NodeId) -> String {
    match kind(id) {
        Some(NodeKind::Text | NodeKind::Comment) => data(id).unwrap_or_default(),
        Some(_) => descendants(id)
            .into_iter()
            .filter(|node| is_text(*node))
            .filter_map(data)
            .collect(),
        None => String::new(),
    }
}

// =============================================================================
// Mutation
// =============================================================================

/// Insert `child` into `parent` before `reference` (or at the end).
///
/// Inserting a fragment moves its children instead. Inserting a node into
/// its own subtree is ignored.
pub fn insert_before(parent: NodeId, child: NodeId, reference: Option<NodeId>) {
    if child == parent || contains(child, parent) || !exists(parent) {
        return;
    }

    let nodes = if kind(child) == Some(NodeKind::Fragment) {
        children(child)
    } else if exists(child) {
        vec![child]
    } else {
        return;
    };

    with_doc_mut(|doc| {
        for node in &nodes {
            doc.detach(*node);
        }

        let Some(target) = doc.get_mut(parent) else {
            return;
        };
        let position = reference
            .and_then(|reference| target.children.iter().position(|c| *c == reference))
            .unwrap_or(target.children.len());
        target
            .children
            .splice(position..position, nodes.iter().copied());

        for node in nodes {
            if let Some(node) = doc.get_mut(node) {
                node.parent = Some(parent);
            }
        }
    });
}

pub fn append_child(parent: NodeId, child: NodeId) {
    insert_before(parent, child, None);
}

/// Insert `node` right after `reference`, which must have a parent.
pub fn insert_after(reference: NodeId, node: NodeId) {
    if let Some(parent) = parent(reference) {
        insert_before(parent, node, next_sibling(reference));
    }
}

/// Insert `nodes` right before `reference`, in order.
pub fn before(reference: NodeId, nodes: &[NodeId]) {
    let Some(parent) = parent(reference) else {
        return;
    };
    for node in nodes {
        if *node != reference {
            insert_before(parent, *node, Some(reference));
        }
    }
}

/// Put `nodes` where `id` is and detach `id`.
pub fn replace_with(id: NodeId, nodes: &[NodeId]) {
    if parent(id).is_none() {
        return;
    }
    before(id, nodes);
    if !nodes.contains(&id) {
        remove(id);
    }
}

/// Detach `id` from its parent. The node stays alive.
pub fn remove(id: NodeId) {
    with_doc_mut(|doc| doc.detach(id));
}

/// Set the data of a text or comment node, or replace the children of an
/// element with a single text node.
pub fn set_text(id: NodeId, text: &str) {
    let replaced = with_doc_mut(|doc| match doc.get_mut(id).map(|node| &mut node.payload) {
        Some(Payload::Text(data) | Payload::Comment(data)) => {
            *data = text.to_string();
            false
        }
        Some(_) => true,
        None => false,
    });

    if replaced {
        for child in children(id) {
            release_node(child);
        }
        if !text.is_empty() {
            append_child(id, create_text(text));
        }
    }
}

/// Merge adjacent text nodes and drop empty ones, recursively.
pub fn normalize(id: NodeId) {
    let mut previous_text: Option<NodeId> = None;

    for child in children(id) {
        if !is_text(child) {
            previous_text = None;
            normalize(child);
            continue;
        }

        let text = data(child).unwrap_or_default();
        if text.is_empty() {
            release_node(child);
        } else if let Some(previous) = previous_text {
            let merged = data(previous).unwrap_or_default() + &text;
            set_text(previous, &merged);
            release_node(child);
        } else {
            previous_text = Some(child);
        }
    }
}

/// Structural equality: same kind, tag, attributes (in any order), data
/// and equal children.
pub fn is_equal_node(a: NodeId, b: NodeId) -> bool {
    let same = with_doc(|doc| match (doc.get(a), doc.get(b)) {
        (Some(left), Some(right)) => {
            left.children.len() == right.children.len()
                && match (&left.payload, &right.payload) {
                    (Payload::Element(l), Payload::Element(r)) => {
                        l.tag == r.tag && l.attributes == r.attributes
                    }
                    (Payload::Text(l), Payload::Text(r)) => l == r,
                    (Payload::Comment(l), Payload::Comment(r)) => l == r,
                    (Payload::Fragment, Payload::Fragment) => true,
                    _ => false,
                }
        }
        _ => false,
    });

    same && children(a)
        .into_iter()
        .zip(children(b))
        .all(|(left, right)| is_equal_node(left, right))
}

/// Copy a node, with its subtree when `deep`. Listeners are not copied.
pub fn clone_node(id: NodeId, deep: bool) -> Option<NodeId> {
    let payload = with_doc(|doc| doc.get(id).map(|node| node.payload.clone()))?;
    let copy = with_doc_mut(|doc| doc.allocate(payload));

    if deep {
        for child in children(id) {
            if let Some(child) = clone_node(child, true) {
                append_child(copy, child);
            }
        }
    }

    Some(copy)
}

// =============================================================================
// Attributes & Properties
// =============================================================================

pub fn get_attribute(id: NodeId, name: &str) -> Option<String> {
    with_doc(|doc| doc.element(id)?.attributes.get(name).cloned())
}

pub fn has_attribute(id: NodeId, name: &str) -> bool {
    with_doc(|doc| {
        doc.element(id)
            .is_some_and(|element| element.attributes.contains_key(name))
    })
}

pub fn set_attribute(id: NodeId, name: &str, value: &str) {
    with_doc_mut(|doc| {
        if let Some(element) = doc.element_mut(id) {
            element
                .attributes
                .insert(name.to_ascii_lowercase(), value.to_string());
        }
    });
}

pub fn remove_attribute(id: NodeId, name: &str) {
    with_doc_mut(|doc| {
        if let Some(element) = doc.element_mut(id) {
            element.attributes.shift_remove(name);
        }
    });
}

/// Attributes in source order.
pub fn attributes(id: NodeId) -> Vec<(String, String)> {
    with_doc(|doc| {
        doc.element(id)
            .map(|element| {
                element
                    .attributes
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    })
}

/// A boolean DOM property. Falls back to attribute presence until set.
pub fn property(id: NodeId, name: &str) -> bool {
    with_doc(|doc| {
        doc.element(id).is_some_and(|element| {
            element
                .properties
                .get(name)
                .copied()
                .unwrap_or_else(|| element.attributes.contains_key(name))
        })
    })
}

pub fn set_property(id: NodeId, name: &str, value: bool) {
    with_doc_mut(|doc| {
        if let Some(element) = doc.element_mut(id) {
            element.properties.insert(name.to_string(), value);
        }
    });
}

/// The live `value` property. Falls back to the `value` attribute until set.
pub fn value(id: NodeId) -> Option<String> {
    with_doc(|doc| {
        let element = doc.element(id)?;
        element
            .value
            .clone()
            .or_else(|| element.attributes.get("value").cloned())
    })
}

pub fn set_value(id: NodeId, value: &str) {
    with_doc_mut(|doc| {
        if let Some(element) = doc.element_mut(id) {
            element.value = Some(value.to_string());
        }
    });
}

// =============================================================================
// Class & Style
// =============================================================================

pub fn class_list(id: NodeId) -> Vec<String> {
    get_attribute(id, "class")
        .map(|classes| classes.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn has_class(id: NodeId, name: &str) -> bool {
    class_list(id).iter().any(|class| class == name)
}

pub fn add_class(id: NodeId, name: &str) {
    let mut classes = class_list(id);
    if !classes.iter().any(|class| class == name) {
        classes.push(name.to_string());
        set_attribute(id, "class", &classes.join(" "));
    }
}

pub fn remove_class(id: NodeId, name: &str) {
    let mut classes = class_list(id);
    let before = classes.len();
    classes.retain(|class| class != name);
    if classes.len() != before {
        set_attribute(id, "class", &classes.join(" "));
    }
}

fn style_map(id: NodeId) -> IndexMap<String, String> {
    get_attribute(id, "style")
        .map(|style| {
            style
                .split(';')
                .filter_map(|declaration| declaration.split_once(':'))
                .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
                .filter(|(name, value)| !name.is_empty() && !value.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn write_style(id: NodeId, style: &IndexMap<String, String>) {
    let css: Vec<String> = style
        .iter()
        .map(|(name, value)| format!("{name}: {value};"))
        .collect();
    set_attribute(id, "style", &css.join(" "));
}

/// Value of one inline style property.
pub fn style_property(id: NodeId, name: &str) -> Option<String> {
    style_map(id).get(name).cloned()
}

pub fn set_style_property(id: NodeId, name: &str, value: &str) {
    if !is_element(id) {
        return;
    }
    let mut style = style_map(id);
    style.insert(name.to_ascii_lowercase(), value.to_string());
    write_style(id, &style);
}

pub fn remove_style_property(id: NodeId, name: &str) {
    let mut style = style_map(id);
    if style.shift_remove(name).is_some() {
        write_style(id, &style);
    }
}

// =============================================================================
// Serialisation
// =============================================================================

fn escape(text: &str, attribute: bool) -> Cow<'_, str> {
    let special = |c: char| {
        c == '&' || (attribute && c == '"') || (!attribute && (c == '<' || c == '>'))
    };
    if !text.contains(special) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' if attribute => escaped.push_str("&quot;"),
            '<' if !attribute => escaped.push_str("&lt;"),
            '>' if !attribute => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// HTML of a node and its subtree.
pub fn outer_html(id: NodeId) -> String {
    let mut html = String::new();
    write_html(id, &mut html, false);
    html
}

/// HTML of a node's children.
pub fn inner_html(id: NodeId) -> String {
    let raw = tag_name(id).is_some_and(|tag| tag == "script" || tag == "style");
    let mut html = String::new();
    for child in children(id) {
        write_html(child, &mut html, raw);
    }
    html
}

fn write_html(id: NodeId, html: &mut String, raw: bool) {
    let payload = with_doc(|doc| doc.get(id).map(|node| node.payload.clone()));

    match payload {
        Some(Payload::Text(text)) if raw => html.push_str(&text),
        Some(Payload::Text(text)) => html.push_str(&escape(&text, false)),
        Some(Payload::Comment(data)) => {
            html.push_str("<!--");
            html.push_str(&data);
            html.push_str("-->");
        }
        Some(Payload::Fragment) => html.push_str(&inner_html(id)),
        Some(Payload::Element(element)) => {
            html.push('<');
            html.push_str(&element.tag);
            for (name, value) in &element.attributes {
                html.push(' ');
                html.push_str(name);
                html.push_str("=\"");
                html.push_str(&escape(value, true));
                html.push('"');
            }
            html.push('>');

            if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                return;
            }

            html.push_str(&inner_html(id));
            html.push_str("</");
            html.push_str(&element.tag);
            html.push('>');
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() {
        reset_dom();
    }

    fn list(items: &[&str]) -> NodeId {
        let list = create_element("ul");
        for item in items {
            let li = create_element("li");
            append_child(li, create_text(item));
            append_child(list, li);
        }
        list
    }

    #[test]
    fn test_tree_building_and_serialising() {
        setup();
        let ul = list(&["a", "b"]);
        assert_eq!(outer_html(ul), "<ul><li>a</li><li>b</li></ul>");
        assert_eq!(text_content(ul), "ab");
        assert_eq!(children(ul).len(), 2);
    }

    #[test]
    fn test_fragment_insertion_moves_children() {
        setup();
        let fragment = create_fragment();
        append_child(fragment, create_text("x"));
        append_child(fragment, create_text("y"));

        let div = create_element("div");
        append_child(div, fragment);

        assert_eq!(children(fragment).len(), 0);
        assert_eq!(text_content(div), "xy");
    }

    #[test]
    fn test_sibling_operations() {
        setup();
        let parent = create_element("div");
        let a = create_text("a");
        let c = create_text("c");
        append_child(parent, a);
        append_child(parent, c);

        let b = create_text("b");
        insert_after(a, b);
        assert_eq!(text_content(parent), "abc");
        assert_eq!(next_sibling(a), Some(b));
        assert_eq!(previous_sibling(c), Some(b));

        let z = create_text("z");
        before(a, &[z]);
        assert_eq!(text_content(parent), "zabc");

        let y = create_text("y");
        replace_with(z, &[y]);
        assert_eq!(text_content(parent), "yabc");
        assert_eq!(parent_of_detached(z), None);
    }

    fn parent_of_detached(id: NodeId) -> Option<NodeId> {
        parent(id)
    }

    #[test]
    fn test_release_invalidates_handles() {
        setup();
        let ul = list(&["a"]);
        let released = std::rc::Rc::new(std::cell::Cell::new(false));
        let flag = released.clone();
        let li = children(ul)[0];
        on_release(li, move || flag.set(true));

        assert_eq!(node_count(), 3);
        release_node(ul);
        assert!(released.get());
        assert_eq!(node_count(), 0);
        assert!(!exists(li));

        // Slots are reused with a new generation.
        let fresh = create_text("n");
        assert_ne!(fresh, ul);
        assert_eq!(text_content(ul), "");
    }

    #[test]
    fn test_normalize_merges_text() {
        setup();
        let div = create_element("div");
        append_child(div, create_text("a"));
        append_child(div, create_text(""));
        append_child(div, create_text("b"));
        append_child(div, create_comment("c"));
        append_child(div, create_text("d"));

        normalize(div);
        assert_eq!(children(div).len(), 3);
        assert_eq!(outer_html(div), "<div>ab<!--c-->d</div>");
    }

    #[test]
    fn test_equality_and_clone() {
        setup();
        let a = create_element("p");
        set_attribute(a, "id", "x");
        set_attribute(a, "class", "y");
        append_child(a, create_text("t"));

        let b = clone_node(a, true).unwrap();
        assert!(is_equal_node(a, b));
        assert_ne!(a, b);

        let c = create_element("p");
        set_attribute(c, "class", "y");
        set_attribute(c, "id", "x");
        assert!(!is_equal_node(a, c));
        append_child(c, create_text("t"));
        assert!(is_equal_node(a, c));
    }

    #[test]
    fn test_class_and_style() {
        setup();
        let div = create_element("div");
        add_class(div, "a");
        add_class(div, "b");
        add_class(div, "a");
        assert_eq!(get_attribute(div, "class").as_deref(), Some("a b"));
        remove_class(div, "a");
        assert!(!has_class(div, "a"));
        assert!(has_class(div, "b"));

        set_style_property(div, "color", "red");
        set_style_property(div, "width", "10px");
        assert_eq!(style_property(div, "color").as_deref(), Some("red"));
        assert_eq!(
            get_attribute(div, "style").as_deref(),
            Some("color: red; width: 10px;")
        );
        remove_style_property(div, "color");
        assert_eq!(style_property(div, "color"), None);
    }

    #[test]
    fn test_properties_and_value() {
        setup();
        let input = create_element("input");
        set_attribute(input, "disabled", "");
        set_attribute(input, "value", "a");
        assert!(property(input, "disabled"));
        assert_eq!(value(input).as_deref(), Some("a"));

        set_property(input, "disabled", false);
        set_value(input, "b");
        assert!(!property(input, "disabled"));
        assert_eq!(value(input).as_deref(), Some("b"));
        assert_eq!(outer_html(input), "<input disabled=\"\" value=\"a\">");
    }

    #[test]
    fn test_escaping() {
        setup();
        let p = create_element("p");
        set_attribute(p, "title", "a\"b&c");
        append_child(p, create_text("<x> & y"));
        assert_eq!(
            outer_html(p),
            "<p title=\"a&quot;b&amp;c\">&lt;x&gt; &amp; y</p>"
        );
    }

    #[test]
    fn test_no_cycles() {
        setup();
        let outer = create_element("div");
        let inner = create_element("div");
        append_child(outer, inner);
        append_child(inner, outer);
        assert_eq!(parent(outer), None);
        assert_eq!(parent(inner), Some(outer));
    }
}
