//! Change notification.

use tracing::trace;

use super::Store;
use crate::key::{PERIOD, ancestors, get_key};
use crate::value::Value;

/// Notify subscribers that `properties` below `prefix` changed.
///
/// Subscribers of each changed key path are called first, in subscription
/// order, then subscribers of every ancestor of `prefix`, most specific
/// first. New values are read when the subscriber is called: from `store`
/// for key paths at or below it, from the root for the ones above.
///
/// The origin reported to a subscriber is the key path that actually
/// changed: `prefix` itself for a bulk change of several properties, the
/// single changed key path otherwise. Subscribers of the origin key get
/// `None`.
pub(crate) fn emit(
    store: &Store,
    prefix: Option<&str>,
    properties: &[String],
    old_values: Vec<Value>,
) {
    let prefix = prefix.filter(|p| !p.is_empty());

    let mut keys: Vec<String> = properties
        .iter()
        .map(|property| get_key([prefix.unwrap_or(""), property.as_str()]))
        .collect();

    let origin = if properties.len() > 1 {
        prefix.map(str::to_string)
    } else {
        keys.first().cloned()
    };

    if let Some(prefix) = prefix {
        keys.extend(ancestors(prefix));
    }

    let state = store.state();

    trace!(
        state = state.id(),
        prefix,
        properties = properties.len(),
        "emit"
    );

    for (index, key) in keys.iter().enumerate() {
        let callbacks = state.callbacks(key);
        if callbacks.is_empty() {
            continue;
        }

        let emit_origin = origin.as_deref().filter(|origin| *origin != key.as_str());
        let new_value = resolve(store, key);
        let old_value = old_values.get(index).cloned().unwrap_or_default();

        for callback in callbacks {
            callback(&new_value, &old_value, emit_origin);
        }
    }
}

/// Current value at `key`, read through `store` when `key` is at or below
/// it, so a dropped root does not hide it.
fn resolve(store: &Store, key: &str) -> Value {
    let Some(prefix) = store.prefix() else {
        return store.peek(key);
    };

    if key == prefix {
        return Value::Store(store.clone());
    }

    match key
        .strip_prefix(prefix.as_str())
        .and_then(|rest| rest.strip_prefix(PERIOD))
    {
        Some(rest) => store.peek(rest),
        None => store
            .state()
            .root()
            .map(|root| root.peek(key))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{Store, subscribe};
    use crate::value::Value;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Calls = Rc<RefCell<Vec<(String, Value, Value, Option<String>)>>>;

    fn record(store: &Store, key: &'static str, calls: &Calls) {
        let calls = calls.clone();
        subscribe(store, key, move |new, old, origin| {
            calls.borrow_mut().push((
                key.to_string(),
                new.clone(),
                old.clone(),
                origin.map(str::to_string),
            ));
        })
        .unwrap();
    }

    #[test]
    fn test_ancestor_gets_origin() {
        let s = Store::new(json!({ "nested": { "key": 1 } })).unwrap();
        let calls = Calls::default();
        record(&s, "nested", &calls);
        record(&s, "nested.key", &calls);

        s.set("nested.key", 2).unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 2);

        // Own key first, no origin.
        assert_eq!(calls[0].0, "nested.key");
        assert_eq!(calls[0].1, Value::Number(2.0));
        assert_eq!(calls[0].2, Value::Number(1.0));
        assert_eq!(calls[0].3, None);

        assert_eq!(calls[1].0, "nested");
        assert_eq!(calls[1].2, Value::Null);
        assert_eq!(calls[1].3.as_deref(), Some("nested.key"));
        assert!(calls[1].1.is_store());
    }

    #[test]
    fn test_deep_write_walks_every_ancestor() {
        let s = Store::new(json!({ "a": { "b": { "c": 1 } } })).unwrap();
        let calls = Calls::default();
        record(&s, "a", &calls);
        record(&s, "a.b", &calls);

        s.set("a.b.c", 5).unwrap();

        let keys: Vec<_> = calls.borrow().iter().map(|c| c.0.clone()).collect();
        assert_eq!(keys, vec!["a.b", "a"]);
        assert!(
            calls
                .borrow()
                .iter()
                .all(|c| c.3.as_deref() == Some("a.b.c"))
        );
    }

    #[test]
    fn test_root_write_has_no_ancestors() {
        let s = Store::new(json!({ "count": 0 })).unwrap();
        let calls = Calls::default();
        record(&s, "count", &calls);

        s.set("count", 1).unwrap();
        s.set("count", 2).unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1, Value::Number(2.0));
        assert_eq!(calls[1].2, Value::Number(1.0));
    }

    #[test]
    fn test_child_store_outlives_root() {
        let nested = {
            let s = Store::new(json!({ "a": { "b": 1 } })).unwrap();
            s.get("a").as_store().cloned().unwrap()
        };
        assert!(nested.state().root().is_none());

        let calls = Calls::default();
        record(&nested, "a.b", &calls);
        record(&nested, "a", &calls);

        nested.set("b", 2).unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, Value::Number(2.0));
        assert_eq!(calls[0].2, Value::Number(1.0));
        assert!(calls[1].1.as_store().is_some_and(|a| a.ptr_eq(&nested)));
        assert_eq!(calls[1].3.as_deref(), Some("a.b"));
        assert_eq!(nested.to_json(), json!({ "b": 2.0 }));
    }
}
