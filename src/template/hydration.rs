//! Hydration - Adopt existing markup instead of rendering new nodes.
//!
//! The template is rendered off-document and compared with the existing
//! node, child by child. When both agree, every binding of the fresh tree
//! is moved onto its counterpart in the existing tree and the fresh tree
//! is released.
//!
//! A mismatch is not an error: it is logged and the existing node is left
//! untouched.

use tracing::{debug, warn};

use super::Template;
use super::binder::{self, NodeProperty};
use crate::dom::{self, NodeId, NodeKind};
use crate::observer::content;

/// Existing node and its freshly rendered counterpart.
type Pair = (NodeId, NodeId);

pub(crate) fn hydrate<'a>(
    node: NodeId,
    template: &Template,
    callback: Option<Box<dyn FnOnce(NodeId) + 'a>>,
) -> NodeId {
    let rendered = template.render(None);
    let mut pairs = Vec::new();

    if normalise_content(node) != normalise_content(rendered)
        || !compare_node(node, rendered, &mut pairs)
    {
        warn!(?node, "Unable to hydrate existing content");
        binder::clean_nodes(&[rendered], true);
        dom::release_node(rendered);
        return node;
    }

    for (existing, fresh) in &pairs {
        content::retarget(*fresh, *existing);
        hydrate_properties(*existing, *fresh);
    }

    binder::clean_nodes(&[rendered], false);
    dom::release_node(rendered);

    debug!(?node, nodes = pairs.len(), "hydrated");

    if let Some(callback) = callback {
        callback(node);
    }

    node
}

/// Compare two trees, collecting matching pairs children first.
fn compare_node(first: NodeId, second: NodeId, pairs: &mut Vec<Pair>) -> bool {
    dom::normalize(first);
    dom::normalize(second);

    let first_children = valid_children(first);
    let second_children = valid_children(second);

    if first_children.len() != second_children.len() {
        warn!(?first, "Nodes do not have same number of children");
        return false;
    }

    if first_children.is_empty() {
        let equal = dom::is_equal_node(first, second) || both_containers(first, second);
        if equal {
            pairs.push((first, second));
        } else {
            warn!(?first, "Nodes are not equal");
        }
        return equal;
    }

    for (left, right) in first_children.into_iter().zip(second_children) {
        if !compare_node(left, right, pairs) {
            return false;
        }
    }

    pairs.push((first, second));
    true
}

fn valid_children(node: NodeId) -> Vec<NodeId> {
    dom::children(node)
        .into_iter()
        .filter(|child| is_valid_node(*child))
        .collect()
}

/// An empty element may stand in for an empty fragment at the root.
fn both_containers(first: NodeId, second: NodeId) -> bool {
    dom::kind(second) == Some(NodeKind::Fragment) && dom::first_child(first).is_none()
}

/// Blank text and scripts take no part in the comparison.
fn is_valid_node(node: NodeId) -> bool {
    match dom::kind(node) {
        Some(NodeKind::Text) => !dom::text_content(node).trim().is_empty(),
        Some(NodeKind::Element) => dom::tag_name(node).as_deref() != Some("script"),
        Some(_) => true,
        None => false,
    }
}

/// Text content with runs of whitespace collapsed.
fn normalise_content(node: NodeId) -> String {
    dom::text_content(node).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Install the bindings recorded on `fresh` on `existing`.
fn hydrate_properties(existing: NodeId, fresh: NodeId) {
    for property in binder::properties(fresh) {
        match property {
            NodeProperty::Attribute { name, getter } => {
                binder::observe_attribute(existing, &name, getter)
            }
            NodeProperty::Event {
                attribute,
                listener,
                ..
            } => binder::add_event(existing, &attribute, listener),
        }
    }
}
