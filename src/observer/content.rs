//! Content observation - Keeps a sentinel's place in sync with a getter.
//!
//! Each observed sentinel becomes a slot. While the content is empty the
//! sentinel comment itself sits in the document; otherwise it is swapped
//! for the rendered items.
//!
//! # Pattern
//!
//! - Text replacing text patches the existing text node in place
//! - Lists of identified templates are reconciled by key: kept items keep
//!   their nodes, new ones are rendered, missing ones are removed
//! - Anything else replaces the previous items wholesale
//!
//! Slots live in a thread-local list. A slot is dropped (and stops
//! observing) when its nodes are cleaned with
//! [`clean_nodes`](crate::template::clean_nodes), or the next time it
//! updates after its nodes were released.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::dom::{self, NodeId, NodeKind};
use crate::key::Key;
use crate::observer::{Getter, ObservationSubscription, observe};
use crate::template::{Content, Template, clean_nodes};

/// Top-level nodes rendered for one piece of content.
#[derive(Debug)]
struct Item {
    identifier: Option<Key>,
    nodes: Vec<NodeId>,
    /// Created here, so released when removed. Nodes handed in by the
    /// caller are only detached.
    owned: bool,
}

struct Slot {
    anchor: Cell<NodeId>,
    /// `None` while the anchor is in the document.
    items: RefCell<Option<Vec<Item>>>,
    is_text: Cell<bool>,
    subscription: RefCell<Option<ObservationSubscription>>,
}

thread_local! {
    static SLOTS: RefCell<Vec<Rc<Slot>>> = const { RefCell::new(Vec::new()) };
}

/// Observe `getter` and render its content where `anchor` is.
pub fn observe_content(anchor: NodeId, getter: &Getter<Content>) {
    let slot = Rc::new(Slot {
        anchor: Cell::new(anchor),
        items: RefCell::new(None),
        is_text: Cell::new(false),
        subscription: RefCell::new(None),
    });
    SLOTS.with(|slots| slots.borrow_mut().push(slot.clone()));

    let weak = Rc::downgrade(&slot);
    let subscription = observe(getter, move |content: &Content| {
        if let Some(slot) = weak.upgrade() {
            slot.update(content);
        }
    });

    *slot.subscription.borrow_mut() = Some(subscription);
}

// =============================================================================
// Slot
// =============================================================================

impl Slot {
    fn update(&self, content: &Content) {
        if self.is_stale() {
            trace!(anchor = ?self.anchor.get(), "stale content slot dropped");
            drop_slots(|slot| std::ptr::eq(Rc::as_ptr(slot), self));
            return;
        }

        let current = self.items.borrow_mut().take();

        let next = match content {
            Content::Empty => {
                self.is_text.set(false);
                self.restore(current)
            }
            Content::List(list) => {
                self.is_text.set(false);
                let flat = flatten(list);
                if flat.is_empty() {
                    self.restore(current)
                } else {
                    self.update_list(current, &flat)
                }
            }
            content => {
                let text = scalar_text(content);

                let patchable = current
                    .as_deref()
                    .and_then(first_node)
                    .filter(|_| self.is_text.get());
                if let (Some(text), Some(node)) = (&text, patchable) {
                    if dom::data(node).as_deref() != Some(text.as_str()) {
                        dom::set_text(node, text);
                    }
                    *self.items.borrow_mut() = current;
                    return;
                }

                self.is_text.set(text.is_some());
                let item = create_item(content);
                self.place(current, vec![item])
            }
        };

        trace!(
            anchor = ?self.anchor.get(),
            items = next.as_ref().map_or(0, Vec::len),
            "content updated"
        );
        *self.items.borrow_mut() = next;
    }

    fn is_stale(&self) -> bool {
        if !dom::exists(self.anchor.get()) {
            return true;
        }
        self.items.borrow().as_ref().is_some_and(|items| {
            items
                .iter()
                .flat_map(|item| &item.nodes)
                .all(|node| !dom::exists(*node))
        })
    }

    /// Put the anchor back in place of `current`.
    fn restore(&self, current: Option<Vec<Item>>) -> Option<Vec<Item>> {
        if let Some(items) = current {
            if let Some(first) = first_node(&items) {
                dom::before(first, &[self.anchor.get()]);
            }
            discard(items, &[]);
        }
        None
    }

    /// Replace `current` (or the anchor) with `next`.
    fn place(&self, current: Option<Vec<Item>>, next: Vec<Item>) -> Option<Vec<Item>> {
        let nodes: Vec<NodeId> = next.iter().flat_map(|item| item.nodes.iter().copied()).collect();
        if nodes.is_empty() {
            return self.restore(current);
        }

        match current {
            Some(items) => {
                if let Some(first) = first_node(&items) {
                    dom::before(first, &nodes);
                }
                discard(items, &nodes);
            }
            None => dom::replace_with(self.anchor.get(), &nodes),
        }

        Some(next)
    }

    fn update_list(&self, current: Option<Vec<Item>>, list: &[&Content]) -> Option<Vec<Item>> {
        let keyed = keyed_templates(list);
        let old_ids = current.as_deref().and_then(identifiers);

        match (keyed, old_ids, current) {
            (Some(keyed), Some(old_ids), Some(current)) => {
                self.reconcile(current, &old_ids, &keyed)
            }
            (keyed, _, current) => {
                let next = match keyed {
                    Some(keyed) => keyed
                        .iter()
                        .map(|(_, template)| render_item(template))
                        .collect(),
                    None => list.iter().map(|content| create_item(content)).collect(),
                };
                self.place(current, next)
            }
        }
    }

    /// Keyed update: reuse the items whose key is still present, render
    /// the new ones and move only what changed position.
    fn reconcile(
        &self,
        current: Vec<Item>,
        old_ids: &[Key],
        keyed: &[(Key, &Template)],
    ) -> Option<Vec<Item>> {
        let Some(mut position) = first_node(&current) else {
            let next = keyed.iter().map(|(_, template)| render_item(template)).collect();
            return self.place(None, next);
        };

        let new_ids: Vec<Key> = keyed.iter().map(|(id, _)| id.clone()).collect();
        let mut previous: IndexMap<Key, Item> = current
            .into_iter()
            .filter_map(|item| item.identifier.clone().map(|id| (id, item)))
            .collect();

        let observed: Vec<Item> = keyed
            .iter()
            .map(|(id, template)| {
                previous
                    .shift_remove(id)
                    .unwrap_or_else(|| render_item(template))
            })
            .collect();

        let order = compare_array_order(old_ids, &new_ids);

        if order != Order::Removed {
            let before = order == Order::Added && !old_ids.contains(&new_ids[0]);
            let placed = observed.iter().flat_map(|item| {
                item.nodes
                    .iter()
                    .map(move |node| (item.identifier.as_ref(), *node))
            });

            for (index, (id, node)) in placed.enumerate() {
                let moved = order == Order::Dissimilar || id.is_none_or(|id| !old_ids.contains(id));
                if moved && node != position {
                    if index == 0 && before {
                        dom::before(position, &[node]);
                    } else if dom::next_sibling(position) != Some(node) {
                        dom::insert_after(position, node);
                    }
                }
                position = node;
            }
        }

        let removed: Vec<Item> = previous.into_values().collect();

        if observed.iter().all(|item| item.nodes.is_empty()) {
            dom::before(position, &[self.anchor.get()]);
            discard(removed, &[]);
            discard(observed, &[]);
            return None;
        }

        discard(removed, &[]);
        Some(observed)
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            subscription.unsubscribe();
        }
    }
}

// =============================================================================
// Items
// =============================================================================

fn first_node(items: &[Item]) -> Option<NodeId> {
    items.iter().flat_map(|item| &item.nodes).next().copied()
}

/// Text for content rendered as a single text node.
fn scalar_text(content: &Content) -> Option<String> {
    match content {
        Content::Bool(_) | Content::Number(_) | Content::Text(_) => content.to_text(),
        _ => None,
    }
}

/// Nested lists are spliced in place; empty entries are skipped.
fn flatten(list: &[Content]) -> Vec<&Content> {
    let mut flat = Vec::with_capacity(list.len());
    for content in list {
        match content {
            Content::List(nested) => flat.extend(flatten(nested)),
            Content::Empty => {}
            content => flat.push(content),
        }
    }
    flat
}

/// The templates of `list` with their keys, if every entry is a template
/// with a key and no key repeats.
fn keyed_templates<'a>(list: &[&'a Content]) -> Option<Vec<(Key, &'a Template)>> {
    let mut seen = HashSet::new();
    list.iter()
        .map(|&content| match content {
            Content::Template(template) => template
                .id()
                .filter(|id| seen.insert(id.clone()))
                .map(|id| (id, template)),
            _ => None,
        })
        .collect()
}

/// Keys of `items`, if every item has one and no key repeats.
fn identifiers(items: &[Item]) -> Option<Vec<Key>> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|item| item.identifier.clone().filter(|id| seen.insert(id.clone())))
        .collect()
}

/// Detach a node's children, or the node itself.
fn top_level(node: NodeId) -> Vec<NodeId> {
    if dom::kind(node) == Some(NodeKind::Fragment) {
        let nodes = dom::children(node);
        for child in &nodes {
            dom::remove(*child);
        }
        nodes
    } else {
        vec![node]
    }
}

fn render_item(template: &Template) -> Item {
    let fragment = template.render(None);
    let nodes = top_level(fragment);
    dom::release_node(fragment);
    Item {
        identifier: template.id(),
        nodes,
        owned: true,
    }
}

fn create_item(content: &Content) -> Item {
    match content {
        Content::Template(template) => render_item(template),
        Content::Node(node) => Item {
            identifier: None,
            nodes: top_level(*node),
            owned: false,
        },
        content => Item {
            identifier: None,
            nodes: vec![dom::create_text(&content.to_text().unwrap_or_default())],
            owned: true,
        },
    }
}

/// Clean and remove `items`, sparing nodes in `keep`.
fn discard(items: Vec<Item>, keep: &[NodeId]) {
    for item in items {
        let nodes: Vec<NodeId> = item
            .nodes
            .into_iter()
            .filter(|node| !keep.contains(node))
            .collect();
        clean_nodes(&nodes, true);
        for node in nodes {
            if item.owned {
                dom::release_node(node);
            } else {
                dom::remove(node);
            }
        }
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    /// Every previous key kept, in order, with new keys around them.
    Added,
    /// Fewer keys, every one of them previous keys in the same order.
    Removed,
    Dissimilar,
}

fn compare_array_order(previous: &[Key], next: &[Key]) -> Order {
    if next.len() < previous.len() && is_subsequence(next, previous) {
        Order::Removed
    } else if is_subsequence(previous, next) {
        Order::Added
    } else {
        Order::Dissimilar
    }
}

/// Whether every key of `short` appears in `long`, in the same order.
fn is_subsequence(short: &[Key], long: &[Key]) -> bool {
    let mut remaining = long.iter();
    short.iter().all(|key| remaining.any(|candidate| candidate == key))
}

// =============================================================================
// Slot registry
// =============================================================================

fn drop_slots(matches: impl Fn(&Rc<Slot>) -> bool) {
    let removed: Vec<Rc<Slot>> = SLOTS.with(|slots| {
        let mut slots = slots.borrow_mut();
        let (removed, kept) = std::mem::take(&mut *slots)
            .into_iter()
            .partition(|slot| matches(slot));
        *slots = kept;
        removed
    });

    for slot in &removed {
        let anchor = slot.anchor.get();
        if let Some(subscription) = slot.subscription.borrow().as_ref() {
            subscription.unsubscribe();
        }
        if dom::parent(anchor).is_none() {
            dom::release_node(anchor);
        }
    }
}

/// Drop the slots rendered into (or anchored at) any of `nodes`.
pub(crate) fn forget(nodes: &HashSet<NodeId>) {
    drop_slots(|slot| {
        nodes.contains(&slot.anchor.get())
            || slot.items.try_borrow().is_ok_and(|items| {
                items
                    .iter()
                    .flatten()
                    .flat_map(|item| &item.nodes)
                    .any(|node| nodes.contains(node))
            })
    });
}

/// Point slots that use `from` at `to` instead.
pub(crate) fn retarget(from: NodeId, to: NodeId) {
    SLOTS.with(|slots| {
        for slot in slots.borrow().iter() {
            if slot.anchor.get() == from {
                slot.anchor.set(to);
            }
            if let Ok(mut items) = slot.items.try_borrow_mut() {
                for node in items.iter_mut().flatten().flat_map(|item| &mut item.nodes) {
                    if *node == from {
                        *node = to;
                    }
                }
            }
        }
    });
}

/// Number of live content slots.
pub fn slot_count() -> usize {
    SLOTS.with(|slots| slots.borrow().len())
}

/// Drop every slot (for testing).
pub fn reset_content() {
    let slots = SLOTS.with(|slots| std::mem::take(&mut *slots.borrow_mut()));
    drop(slots);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{children, data, exists, inner_html, is_comment, reset_dom};
    use crate::observer::reset_observer_state;
    use crate::scheduler::{reset_frames, run_frame};
    use crate::store::Store;
    use crate::template::{Expression, binder::reset_bindings, reactive, template};
    use crate::value::Value;
    use serde_json::json;

    fn setup() {
        reset_dom();
        reset_bindings();
        reset_frames();
        reset_observer_state();
    }

    fn row(n: f64) -> Template {
        template(["<li>", "</li>"], vec![Expression::from(n)]).identify(n)
    }

    /// `<ul>` whose items are keyed rows built from `items`.
    fn keyed_list(s: &Store) -> NodeId {
        let reader = s.clone();
        let list = template(
            ["<ul>", "</ul>"],
            vec![reactive(move || {
                let items = reader.get("items");
                let values = items.as_store().map(Store::values).unwrap_or_default();
                values
                    .iter()
                    .map(|value| row(value.as_f64().unwrap_or_default()))
                    .collect::<Vec<_>>()
            })],
        );
        let fragment = list.render(None);
        children(fragment)[0]
    }

    #[test]
    fn test_text_is_patched_in_place() {
        setup();
        let s = Store::new(json!({ "label": "a" })).unwrap();
        let reader = s.clone();
        let fragment =
            template(["<p>", "</p>"], vec![reactive(move || reader.get("label"))]).render(None);
        let paragraph = children(fragment)[0];
        let text = children(paragraph)[0];
        assert_eq!(data(text).as_deref(), Some("a"));

        s.set("label", "b").unwrap();
        run_frame();
        assert_eq!(children(paragraph), vec![text]);
        assert_eq!(data(text).as_deref(), Some("b"));

        s.set("label", 3).unwrap();
        run_frame();
        assert_eq!(children(paragraph), vec![text]);
        assert_eq!(inner_html(paragraph), "3");
    }

    #[test]
    fn test_empty_content_restores_the_sentinel() {
        setup();
        let s = Store::new(json!({ "label": "a" })).unwrap();
        let reader = s.clone();
        let fragment =
            template(["<p>", "</p>"], vec![reactive(move || reader.get("label"))]).render(None);
        let paragraph = children(fragment)[0];
        let text = children(paragraph)[0];

        s.set("label", Value::Null).unwrap();
        run_frame();
        let nodes = children(paragraph);
        assert_eq!(nodes.len(), 1);
        assert!(is_comment(nodes[0]));
        assert!(!exists(text));

        s.set("label", "back").unwrap();
        run_frame();
        assert_eq!(inner_html(paragraph), "back");
    }

    #[test]
    fn test_keyed_list_reuses_nodes() {
        setup();
        let s = Store::new(json!({ "items": [1, 2, 3] })).unwrap();
        let list = keyed_list(&s);
        let before = children(list);
        assert_eq!(inner_html(list), "<li>1</li><li>2</li><li>3</li>");

        s.set("items", json!([2, 3, 4])).unwrap();
        run_frame();

        let after = children(list);
        assert_eq!(inner_html(list), "<li>2</li><li>3</li><li>4</li>");
        assert_eq!(&after[..2], &before[1..]);
        assert!(!before.contains(&after[2]));
        assert!(!exists(before[0]));
    }

    #[test]
    fn test_keyed_insert_at_front_and_remove() {
        setup();
        let s = Store::new(json!({ "items": [2, 3] })).unwrap();
        let list = keyed_list(&s);
        let before = children(list);

        s.get("items").as_store().unwrap().unshift([1]);
        run_frame();
        let after = children(list);
        assert_eq!(inner_html(list), "<li>1</li><li>2</li><li>3</li>");
        assert_eq!(&after[1..], &before[..]);

        s.get("items").as_store().unwrap().splice(1, 1, Vec::<Value>::new());
        run_frame();
        assert_eq!(inner_html(list), "<li>1</li><li>3</li>");
        assert_eq!(children(list), vec![after[0], after[2]]);
    }

    #[test]
    fn test_reordered_keys_move_nodes() {
        setup();
        let s = Store::new(json!({ "items": [1, 2, 3] })).unwrap();
        let list = keyed_list(&s);
        let before = children(list);

        s.get("items").as_store().unwrap().reverse();
        run_frame();
        assert_eq!(inner_html(list), "<li>3</li><li>2</li><li>1</li>");
        assert_eq!(children(list), vec![before[2], before[1], before[0]]);
    }

    #[test]
    fn test_keyed_swap_of_removed_and_added() {
        setup();
        let s = Store::new(json!({ "items": [1, 2, 3] })).unwrap();
        let list = keyed_list(&s);
        let before = children(list);

        s.set("items", json!([2, 4])).unwrap();
        run_frame();
        let after = children(list);
        assert_eq!(inner_html(list), "<li>2</li><li>4</li>");
        assert_eq!(after[0], before[1]);
        assert!(!exists(before[0]));
        assert!(!exists(before[2]));

        s.set("items", json!([5, 2])).unwrap();
        run_frame();
        assert_eq!(inner_html(list), "<li>5</li><li>2</li>");
        assert_eq!(children(list)[1], before[1]);
    }

    #[test]
    fn test_keyed_new_item_ahead_of_kept_one() {
        setup();
        let s = Store::new(json!({ "items": [1, 2] })).unwrap();
        let list = keyed_list(&s);
        let before = children(list);

        s.set("items", json!([3, 1])).unwrap();
        run_frame();
        assert_eq!(inner_html(list), "<li>3</li><li>1</li>");
        assert_eq!(children(list)[1], before[0]);

        s.set("items", json!([3, 1, 2])).unwrap();
        run_frame();
        let kept = children(list);
        s.set("items", json!([3, 2, 1])).unwrap();
        run_frame();
        assert_eq!(inner_html(list), "<li>3</li><li>2</li><li>1</li>");
        assert_eq!(children(list), vec![kept[0], kept[2], kept[1]]);
    }

    #[test]
    fn test_unkeyed_list_replaces_everything() {
        setup();
        let s = Store::new(json!({ "items": ["a", "b"] })).unwrap();
        let reader = s.clone();
        let fragment =
            template(["<div>", "</div>"], vec![reactive(move || reader.get("items"))]).render(None);
        let div = children(fragment)[0];
        let before = children(div);
        assert_eq!(inner_html(div), "ab");

        s.set("items", json!(["a", "c", "d"])).unwrap();
        run_frame();
        assert_eq!(inner_html(div), "acd");
        assert!(before.iter().all(|node| !exists(*node)));

        s.set("items", json!([])).unwrap();
        run_frame();
        assert!(is_comment(children(div)[0]));
    }

    #[test]
    fn test_caller_nodes_are_detached_not_released() {
        setup();
        let s = Store::new(json!({ "show": true })).unwrap();
        let badge = dom::create_element("em");
        let reader = s.clone();
        let fragment = template(
            ["<p>", "</p>"],
            vec![reactive(move || {
                if reader.get("show") == Value::Bool(true) {
                    Content::Node(badge)
                } else {
                    Content::Empty
                }
            })],
        )
        .render(None);
        let paragraph = children(fragment)[0];
        assert_eq!(children(paragraph), vec![badge]);

        s.set("show", false).unwrap();
        run_frame();
        assert!(exists(badge));
        assert_eq!(dom::parent(badge), None);
    }

    #[test]
    fn test_cleaning_stops_the_slot() {
        setup();
        let s = Store::new(json!({ "label": "a" })).unwrap();
        let reader = s.clone();
        let fragment =
            template(["<p>", "</p>"], vec![reactive(move || reader.get("label"))]).render(None);
        assert_eq!(slot_count(), 1);

        clean_nodes(&[fragment], true);
        assert_eq!(slot_count(), 0);

        s.set("label", "b").unwrap();
        run_frame();
        assert_eq!(inner_html(fragment), "<p>a</p>");
    }

    #[test]
    fn test_released_slot_is_dropped_on_next_update() {
        setup();
        let s = Store::new(json!({ "label": "a" })).unwrap();
        let reader = s.clone();
        let fragment =
            template(["<p>", "</p>"], vec![reactive(move || reader.get("label"))]).render(None);

        dom::release_node(fragment);
        assert_eq!(slot_count(), 1);

        s.set("label", "b").unwrap();
        run_frame();
        assert_eq!(slot_count(), 0);
        assert_eq!(s.state().subscribed_keys(), 0);
    }

    #[test]
    fn test_array_order() {
        let keys = |ids: &[usize]| ids.iter().map(|id| Key::Index(*id)).collect::<Vec<_>>();
        assert_eq!(compare_array_order(&keys(&[1, 2]), &keys(&[1, 2, 3])), Order::Added);
        assert_eq!(compare_array_order(&keys(&[2, 3]), &keys(&[1, 2, 3])), Order::Added);
        assert_eq!(compare_array_order(&keys(&[1, 2, 3]), &keys(&[1, 3])), Order::Removed);
        assert_eq!(compare_array_order(&keys(&[1, 2, 3]), &keys(&[2, 3, 4])), Order::Dissimilar);
        assert_eq!(compare_array_order(&keys(&[1, 2]), &keys(&[2, 1])), Order::Dissimilar);
        assert_eq!(compare_array_order(&keys(&[1, 2, 3]), &keys(&[2, 4])), Order::Dissimilar);
        assert_eq!(compare_array_order(&keys(&[1, 2]), &keys(&[3, 1])), Order::Dissimilar);
        assert_eq!(compare_array_order(&keys(&[1, 2]), &keys(&[1, 2])), Order::Added);
    }
}
