//! Attribute observation.
//!
//! The attribute name picks how an observed value is applied:
//!
//! | Name | Effect |
//! |------|--------|
//! | `checked`, `disabled`, `hidden`, ... | boolean DOM property |
//! | `class.a.b` | adds or removes classes `a` and `b` |
//! | `style.width[.px]` | sets or removes one inline style property |
//! | `value` | `value` property and attribute |
//! | anything else | plain attribute, removed for empty content |
//!
//! Boolean, class and style attributes are removed from the element before
//! the first value is applied.

use crate::dom::{self, NodeId};
use crate::observer::{Getter, ObservationSubscription, observe};
use crate::template::Content;

/// Attributes reflected as boolean DOM properties.
pub const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "checked",
    "disabled",
    "hidden",
    "inert",
    "multiple",
    "open",
    "readonly",
    "required",
    "selected",
];

enum Kind {
    Boolean,
    Class(Vec<String>),
    Style { property: String, suffix: Option<String> },
    Value,
    Plain,
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &name[prefix.len()..])
}

/// Work out how `name` is applied. `None` when a class or style name has
/// nothing usable in it.
fn kind(name: &str) -> Option<Kind> {
    if BOOLEAN_ATTRIBUTES.iter().any(|attribute| attribute.eq_ignore_ascii_case(name)) {
        return Some(Kind::Boolean);
    }

    if let Some(rest) = strip_prefix_ignore_case(name, "class.") {
        let classes: Vec<String> = rest
            .split('.')
            .map(str::trim)
            .filter(|class| !class.is_empty())
            .map(str::to_string)
            .collect();
        return (!classes.is_empty()).then_some(Kind::Class(classes));
    }

    if let Some(rest) = strip_prefix_ignore_case(name, "style.") {
        let mut parts = rest.split('.');
        let property = parts.next().unwrap_or_default().trim();
        let suffix = parts.next().map(str::trim);
        if property.is_empty() || suffix.is_some_and(str::is_empty) {
            return None;
        }
        return Some(Kind::Style {
            property: property.to_string(),
            suffix: suffix.map(str::to_string),
        });
    }

    if name.eq_ignore_ascii_case("value") {
        return Some(Kind::Value);
    }

    Some(Kind::Plain)
}

/// Observe `getter` and apply its value to attribute `name` of `element`.
///
/// Returns `None`, installing nothing, for a class or style name with no
/// class or property in it.
pub fn observe_attribute(
    element: NodeId,
    name: &str,
    getter: &Getter<Content>,
) -> Option<ObservationSubscription> {
    let applied = kind(name);

    if !matches!(applied, Some(Kind::Value | Kind::Plain)) {
        dom::remove_attribute(element, name);
    }

    let is_value = matches!(applied, Some(Kind::Value));
    let name = name.to_string();

    let subscription = match applied? {
        Kind::Boolean => observe(getter, move |content: &Content| match content {
            Content::Bool(value) => dom::set_property(element, &name, *value),
            Content::Empty => dom::set_property(element, &name, false),
            _ => {}
        }),

        Kind::Class(classes) => observe(getter, move |content: &Content| {
            for class in &classes {
                if matches!(content, Content::Bool(true)) {
                    dom::add_class(element, class);
                } else {
                    dom::remove_class(element, class);
                }
            }
        }),

        Kind::Style { property, suffix } => observe(getter, move |content: &Content| {
            let value = match (content, &suffix) {
                (Content::Empty | Content::Bool(false), _) | (Content::Bool(true), None) => None,
                (Content::Bool(true), Some(suffix)) => Some(suffix.clone()),
                (content, suffix) => content
                    .to_text()
                    .map(|text| format!("{text}{}", suffix.as_deref().unwrap_or_default())),
            };
            match value {
                Some(value) => dom::set_style_property(element, &property, &value),
                None => dom::remove_style_property(element, &property),
            }
        }),

        Kind::Value | Kind::Plain => observe(getter, move |content: &Content| {
            let text = content.to_text();
            if is_value {
                dom::set_value(element, text.as_deref().unwrap_or_default());
            }
            match text {
                Some(text) => dom::set_attribute(element, &name, &text),
                None => dom::remove_attribute(element, &name),
            }
        }),
    };

    Some(subscription)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{getter, reset_observer_state};
    use crate::scheduler::{reset_frames, run_frame};
    use crate::store::Store;
    use crate::value::Value;
    use serde_json::json;

    fn setup() -> NodeId {
        dom::reset_dom();
        reset_frames();
        reset_observer_state();
        dom::create_element("div")
    }

    fn flag_getter(s: &Store) -> Getter<Content> {
        let s = s.clone();
        getter(move || Content::from(s.get("flag")))
    }

    #[test]
    fn test_boolean_property_follows_store() {
        let element = setup();
        dom::set_attribute(element, "hidden", "<!--blixt-->");
        let s = Store::new(json!({ "flag": true })).unwrap();

        let _sub = observe_attribute(element, "hidden", &flag_getter(&s)).unwrap();
        assert!(!dom::has_attribute(element, "hidden"));
        assert!(dom::property(element, "hidden"));

        s.set("flag", false).unwrap();
        assert!(dom::property(element, "hidden"));
        run_frame();
        assert!(!dom::property(element, "hidden"));

        s.set("flag", Value::Null).unwrap();
        dom::set_property(element, "hidden", true);
        run_frame();
        assert!(!dom::property(element, "hidden"));

        // Non-boolean values leave the property alone.
        s.set("flag", "yes").unwrap();
        dom::set_property(element, "hidden", true);
        run_frame();
        assert!(dom::property(element, "hidden"));
    }

    #[test]
    fn test_class_groups() {
        let element = setup();
        dom::set_attribute(element, "class", "base");
        let s = Store::new(json!({ "flag": true })).unwrap();

        let _sub = observe_attribute(element, "class.active. big ", &flag_getter(&s)).unwrap();
        assert_eq!(dom::class_list(element), vec!["base", "active", "big"]);

        s.set("flag", 1).unwrap();
        run_frame();
        assert_eq!(dom::class_list(element), vec!["base"]);
    }

    #[test]
    fn test_style_with_and_without_suffix() {
        let element = setup();
        let s = Store::new(json!({ "flag": true })).unwrap();

        let _color = observe_attribute(element, "style.color.red", &flag_getter(&s)).unwrap();
        assert_eq!(dom::style_property(element, "color").as_deref(), Some("red"));

        s.set("flag", false).unwrap();
        run_frame();
        assert_eq!(dom::style_property(element, "color"), None);

        let w = Store::new(json!({ "width": 10 })).unwrap();
        let width = {
            let w = w.clone();
            getter(move || Content::from(w.get("width")))
        };
        let _width = observe_attribute(element, "style.width.px", &width).unwrap();
        assert_eq!(dom::style_property(element, "width").as_deref(), Some("10px"));

        // `true` with no suffix removes the property.
        let bare = getter(|| Content::Bool(true));
        dom::set_style_property(element, "margin", "1px");
        let _margin = observe_attribute(element, "style.margin", &bare).unwrap();
        assert_eq!(dom::style_property(element, "margin"), None);
    }

    #[test]
    fn test_unusable_names_install_nothing() {
        let element = setup();
        dom::set_attribute(element, "class.", "x");
        let any = getter(|| Content::Bool(true));

        assert!(observe_attribute(element, "class.", &any).is_none());
        assert!(!dom::has_attribute(element, "class."));
        assert!(observe_attribute(element, "style..px", &any).is_none());
        assert!(observe_attribute(element, "style.width.", &any).is_none());
    }

    #[test]
    fn test_value_and_plain_attributes() {
        let element = setup();
        let s = Store::new(json!({ "text": "hi" })).unwrap();
        let text = {
            let s = s.clone();
            getter(move || Content::from(s.get("text")))
        };

        let _value = observe_attribute(element, "value", &text).unwrap();
        let _title = observe_attribute(element, "title", &text).unwrap();
        assert_eq!(dom::value(element).as_deref(), Some("hi"));
        assert_eq!(dom::get_attribute(element, "title").as_deref(), Some("hi"));

        s.set("text", Value::Null).unwrap();
        run_frame();
        assert_eq!(dom::value(element).as_deref(), Some(""));
        assert!(!dom::has_attribute(element, "title"));
        assert!(!dom::has_attribute(element, "value"));
    }
}
