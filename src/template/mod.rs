//! Templates - Markup with live expressions.
//!
//! A [`Template`] is a list of static markup strings with an [`Expression`]
//! between each pair. Rendering inlines static text, puts a sentinel comment
//! wherever an expression needs a live binding, parses the result and then
//! binds every sentinel to its expression.
//!
//! # Pattern
//!
//! - In content position, a reactive expression becomes an observed content
//!   slot (text, nodes, nested templates or keyed lists)
//! - In attribute position, a reactive expression becomes an observed
//!   attribute, and `@event[:modifier]` attributes take a listener
//! - Templates marked with [`Template::identify`] are reused by key when
//!   they reappear in a list
//!
//! # Example
//!
//! ```ignore
//! use blixt::{Store, on, reactive, template};
//!
//! let s = Store::new(json!({ "count": 0 }))?;
//!
//! let counter = template(
//!     ["<button @click=\"", "\">", "</button>"],
//!     vec![
//!         on({
//!             let s = s.clone();
//!             move |_| {
//!                 let count = s.get("count").as_f64().unwrap_or(0.0);
//!                 let _ = s.set("count", count + 1.0);
//!             }
//!         }),
//!         reactive({ let s = s.clone(); move || s.get("count") }),
//!     ],
//! );
//!
//! let root = blixt::dom::create_element("main");
//! counter.render(Some(root));
//! ```

pub mod binder;
pub mod hydration;

pub use binder::clean_nodes;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::dom::events::Listener;
use crate::dom::{self, Event, NodeId};
use crate::key::{Key, format_number};
use crate::observer::Getter;
use crate::value::Value;

/// Comment data marking a live expression in rendered markup.
pub const SENTINEL_DATA: &str = "blixt";

/// The sentinel as it appears in template markup.
pub const SENTINEL: &str = "<!--blixt-->";

// =============================================================================
// Expression
// =============================================================================

/// A value placed between two markup strings.
#[derive(Clone)]
pub enum Expression {
    /// Inlined into the markup as is.
    Text(String),
    /// Observed content or attribute value.
    Reactive(Getter<Content>),
    /// Event listener for an `@event` attribute.
    Listener(Listener),
    /// An existing node, moved into place.
    Node(NodeId),
    /// A nested template, rendered in place.
    Template(Template),
    /// Flattened into its items.
    List(Vec<Expression>),
}

impl Expression {
    /// Whether the expression is bound through a sentinel.
    fn is_live(&self) -> bool {
        matches!(
            self,
            Expression::Reactive(_)
                | Expression::Listener(_)
                | Expression::Node(_)
                | Expression::Template(_)
        )
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Expression::Reactive(_) => f.write_str("Reactive"),
            Expression::Listener(_) => f.write_str("Listener"),
            Expression::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Expression::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Expression::List(items) => f.debug_tuple("List").field(items).finish(),
        }
    }
}

/// A reactive expression: re-evaluated whenever the store keys it reads
/// change.
pub fn reactive<C, F>(f: F) -> Expression
where
    C: Into<Content>,
    F: Fn() -> C + 'static,
{
    Expression::Reactive(Rc::new(move || f().into()))
}

/// An event listener expression.
pub fn on<F>(f: F) -> Expression
where
    F: Fn(&Event) + 'static,
{
    Expression::Listener(Rc::new(f))
}

impl From<&str> for Expression {
    fn from(text: &str) -> Self {
        Expression::Text(text.to_string())
    }
}

impl From<String> for Expression {
    fn from(text: String) -> Self {
        Expression::Text(text)
    }
}

impl From<bool> for Expression {
    fn from(value: bool) -> Self {
        Expression::Text(value.to_string())
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::Text(format_number(value))
    }
}

impl From<i32> for Expression {
    fn from(value: i32) -> Self {
        Expression::Text(value.to_string())
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Expression::Text(value.to_string())
    }
}

impl From<usize> for Expression {
    fn from(value: usize) -> Self {
        Expression::Text(value.to_string())
    }
}

impl From<NodeId> for Expression {
    fn from(node: NodeId) -> Self {
        Expression::Node(node)
    }
}

impl From<Template> for Expression {
    fn from(template: Template) -> Self {
        Expression::Template(template)
    }
}

impl From<Getter<Content>> for Expression {
    fn from(getter: Getter<Content>) -> Self {
        Expression::Reactive(getter)
    }
}

impl<T: Into<Expression>> From<Vec<T>> for Expression {
    fn from(items: Vec<T>) -> Self {
        Expression::List(items.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// Content
// =============================================================================

/// What a reactive expression yields.
#[derive(Clone, Debug, Default)]
pub enum Content {
    /// Nothing is rendered; the slot keeps its place.
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    Node(NodeId),
    Template(Template),
    List(Vec<Content>),
}

impl Content {
    /// Text form used for text nodes and attribute values. `None` for
    /// empty content and nodes.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Content::Empty | Content::Node(_) | Content::Template(_) => None,
            Content::Bool(value) => Some(value.to_string()),
            Content::Number(value) => Some(format_number(*value)),
            Content::Text(text) => Some(text.clone()),
            Content::List(items) => Some(
                items
                    .iter()
                    .map(|item| item.to_text().unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }
}

impl From<()> for Content {
    fn from(_: ()) -> Self {
        Content::Empty
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<bool> for Content {
    fn from(value: bool) -> Self {
        Content::Bool(value)
    }
}

impl From<f64> for Content {
    fn from(value: f64) -> Self {
        Content::Number(value)
    }
}

impl From<i32> for Content {
    fn from(value: i32) -> Self {
        Content::Number(value.into())
    }
}

impl From<i64> for Content {
    fn from(value: i64) -> Self {
        Content::Number(value as f64)
    }
}

impl From<usize> for Content {
    fn from(value: usize) -> Self {
        Content::Number(value as f64)
    }
}

impl From<NodeId> for Content {
    fn from(node: NodeId) -> Self {
        Content::Node(node)
    }
}

impl From<Template> for Content {
    fn from(template: Template) -> Self {
        Content::Template(template)
    }
}

impl<T: Into<Content>> From<Option<T>> for Content {
    fn from(value: Option<T>) -> Self {
        value.map_or(Content::Empty, Into::into)
    }
}

impl<T: Into<Content>> From<Vec<T>> for Content {
    fn from(items: Vec<T>) -> Self {
        Content::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<&Value> for Content {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Content::Empty,
            Value::Bool(value) => Content::Bool(*value),
            Value::Number(value) => Content::Number(*value),
            Value::String(text) => Content::Text(text.clone()),
            Value::List(items) => Content::List(items.iter().map(Content::from).collect()),
            Value::Map(_) => Content::Text(value.to_json().to_string()),
            Value::Store(store) => Content::from(&store.to_plain()),
        }
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::from(&value)
    }
}

// =============================================================================
// Template
// =============================================================================

struct TemplateInner {
    strings: Vec<String>,
    expressions: Vec<Expression>,
    identifier: RefCell<Option<Key>>,
}

/// Markup strings with expressions between them.
///
/// Cheap to clone; clones share the identifier.
#[derive(Clone)]
pub struct Template(Rc<TemplateInner>);

/// Create a template from its markup strings and the expressions that go
/// between them.
pub fn template<I, S>(strings: I, expressions: Vec<Expression>) -> Template
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Template::new(strings, expressions)
}

impl Template {
    pub fn new<I, S>(strings: I, expressions: Vec<Expression>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Rc::new(TemplateInner {
            strings: strings.into_iter().map(Into::into).collect(),
            expressions,
            identifier: RefCell::new(None),
        }))
    }

    /// Key used to match this template against earlier renders in a list.
    pub fn id(&self) -> Option<Key> {
        self.0.identifier.borrow().clone()
    }

    /// Set the list identity. Only the first call has any effect.
    pub fn identify(self, key: impl Into<Key>) -> Self {
        {
            let mut identifier = self.0.identifier.borrow_mut();
            if identifier.is_none() {
                *identifier = Some(key.into());
            }
        }
        self
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The markup with a sentinel for every live expression, and those
    /// expressions in document order.
    pub fn to_html(&self) -> (String, Vec<Expression>) {
        let mut html = String::new();
        let mut live = Vec::new();

        for (index, string) in self.0.strings.iter().enumerate() {
            html.push_str(string);
            if let Some(expression) = self.0.expressions.get(index) {
                express(&mut html, &mut live, expression);
            }
        }

        (html, live)
    }

    /// Render into a new fragment, or append to `parent` and return it.
    pub fn render(&self, parent: Option<NodeId>) -> NodeId {
        let (html, expressions) = self.to_html();
        let fragment = create_nodes(&html);

        trace!(expressions = expressions.len(), "render template");
        binder::bind(fragment, expressions);

        match parent {
            Some(parent) => {
                dom::append_child(parent, fragment);
                dom::release_node(fragment);
                parent
            }
            None => fragment,
        }
    }

    /// Adopt `node`, which must hold markup equal to what this template
    /// renders, binding its expressions to the existing nodes.
    ///
    /// On a mismatch a warning is logged and `node` is returned untouched.
    pub fn hydrate(&self, node: NodeId) -> NodeId {
        hydration::hydrate(node, self, None)
    }

    /// Like [`hydrate`](Self::hydrate), calling `callback` with the node
    /// once it has been adopted.
    pub fn hydrate_with<F>(&self, node: NodeId, callback: F) -> NodeId
    where
        F: FnOnce(NodeId),
    {
        hydration::hydrate(node, self, Some(Box::new(callback)))
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("id", &self.id())
            .field("strings", &self.0.strings)
            .finish_non_exhaustive()
    }
}

fn express(html: &mut String, live: &mut Vec<Expression>, expression: &Expression) {
    match expression {
        Expression::Text(text) => html.push_str(text),
        Expression::List(items) => {
            for item in items {
                express(html, live, item);
            }
        }
        _ if expression.is_live() => {
            html.push_str(SENTINEL);
            live.push(expression.clone());
        }
        _ => {}
    }
}

/// Parse markup, dropping scripts and merging text.
fn create_nodes(html: &str) -> NodeId {
    let fragment = dom::parse_fragment(html);

    for node in dom::descendants(fragment) {
        if dom::tag_name(node).as_deref() == Some("script") {
            dom::release_node(node);
        }
    }

    dom::normalize(fragment);
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{children, inner_html, node_count, reset_dom};

    fn setup() {
        reset_dom();
        crate::scheduler::reset_frames();
        crate::observer::reset_observer_state();
    }

    #[test]
    fn test_to_html_flattens_and_marks() {
        let nested = template(["<i>x</i>"], vec![]);
        let t = template(
            ["<p class=\"", "\">", "", "</p>"],
            vec![
                "big".into(),
                vec![Expression::from("a"), Expression::from(1), nested.into()].into(),
                reactive(|| "live"),
            ],
        );

        let (html, live) = t.to_html();
        assert_eq!(html, "<p class=\"big\">a1<!--blixt--><!--blixt--></p>");
        assert_eq!(live.len(), 2);
        assert!(matches!(live[0], Expression::Template(_)));
        assert!(matches!(live[1], Expression::Reactive(_)));
    }

    #[test]
    fn test_identify_only_once() {
        let t = template(["<li></li>"], vec![]).identify(1).identify("two");
        assert_eq!(t.id(), Some(Key::Index(1)));
        assert_eq!(template([""], vec![]).id(), None);
    }

    #[test]
    fn test_render_strips_scripts_and_nests() {
        setup();
        let inner = template(["<b>inner</b>"], vec![]);
        let t = template(
            ["<div>a", "<script>alert(1)</script>b</div>"],
            vec![inner.into()],
        );

        let fragment = t.render(None);
        assert_eq!(inner_html(fragment), "<div>a<b>inner</b>b</div>");
    }

    #[test]
    fn test_render_into_parent_returns_parent() {
        setup();
        let parent = dom::create_element("section");
        let t = template(["<p>one</p><p>two</p>"], vec![]);

        assert_eq!(t.render(Some(parent)), parent);
        assert_eq!(children(parent).len(), 2);
        // The intermediate fragment is freed.
        assert_eq!(node_count(), 5);
    }

    #[test]
    fn test_render_twice_is_independent() {
        setup();
        let t = template(["<p>", "</p>"], vec![reactive(|| "x")]);
        let first = t.render(None);
        let second = t.render(None);
        assert_eq!(inner_html(first), "<p>x</p>");
        assert_eq!(inner_html(second), "<p>x</p>");
    }

    #[test]
    fn test_content_from_values() {
        assert!(matches!(Content::from(Value::Null), Content::Empty));
        assert_eq!(Content::from(Value::from(2.5)).to_text().as_deref(), Some("2.5"));
        assert_eq!(
            Content::from(vec![Content::from(1), Content::from("a")]).to_text().as_deref(),
            Some("1,a")
        );
        assert_eq!(Content::from(None::<i32>).to_text(), None);
    }
}
