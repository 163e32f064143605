//! Array mutators.
//!
//! Each mutator snapshots the array, wraps inserted objects into child stores
//! at their destination index, applies the change, and then emits once for
//! every index whose value changed, every index that was added, and
//! `length` when it moved. Child stores that changed position are moved to
//! their new key path.
//!
//! On an object store every mutator is a no-op returning the default value.

use std::cmp::Ordering;
use std::ops::{Bound, RangeBounds};

use super::{Data, Store, emit, wrap};
use crate::key::MAX_ARRAY_LENGTH;
use crate::value::Value;

impl Store {
    /// Append items. Returns the new length.
    pub fn push<I>(&self, items: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items = self.wrap_from(self.len_untracked(), items);
        self.mutate(|list| {
            list.extend(items);
            list.len()
        })
        .unwrap_or_default()
    }

    /// Remove and return the last item (`Null` when empty).
    pub fn pop(&self) -> Value {
        self.mutate(|list| list.pop().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Remove and return the first item (`Null` when empty).
    pub fn shift(&self) -> Value {
        self.mutate(|list| {
            if list.is_empty() {
                Value::Null
            } else {
                list.remove(0)
            }
        })
        .unwrap_or_default()
    }

    /// Prepend items. Returns the new length.
    pub fn unshift<I>(&self, items: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items = self.wrap_from(0, items);
        self.mutate(|list| {
            list.splice(0..0, items);
            list.len()
        })
        .unwrap_or_default()
    }

    /// Remove `delete_count` items at `start` and insert `items` in their
    /// place. Returns the removed items.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let length = self.len_untracked();
        let start = start.min(length);
        let end = start.saturating_add(delete_count).min(length);
        let items = self.wrap_from(start, items);

        self.mutate(|list| list.splice(start..end, items).collect())
            .unwrap_or_default()
    }

    /// Sort by string form, with `Null` last.
    pub fn sort(&self) {
        self.sort_by(default_order);
    }

    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        self.mutate(|list| list.sort_by(compare));
    }

    pub fn reverse(&self) {
        self.mutate(|list| list.reverse());
    }

    /// Set every index in `range` to (its own copy of) `value`.
    pub fn fill(&self, value: impl Into<Value>, range: impl RangeBounds<usize>) {
        let (start, end) = resolve(range, self.len_untracked());
        let value = value.into();
        let items: Vec<Value> = (start..end)
            .map(|index| self.wrap_at(index, value.clone()))
            .collect();

        self.mutate(|list| {
            for (index, item) in (start..end).zip(items) {
                list[index] = item;
            }
        });
    }

    /// Copy the items in `range` to `target`, without changing the length.
    pub fn copy_within(&self, target: usize, range: impl RangeBounds<usize>) {
        let length = self.len_untracked();
        let (start, end) = resolve(range, length);
        let target = target.min(length);
        let count = (end - start).min(length - target);

        let items: Vec<Value> = (0..count)
            .map(|offset| {
                let source = self.child(&(start + offset).to_string());
                self.wrap_at(target + offset, source)
            })
            .collect();

        self.mutate(|list| {
            for (offset, item) in items.into_iter().enumerate() {
                list[target + offset] = item;
            }
        });
    }

    /// Assignment to `length`: shrink, or pad with `Null`.
    pub(super) fn truncate(&self, length: Value) -> bool {
        let Some(length) = length
            .as_f64()
            .filter(|n| n.fract() == 0.0 && (0.0..=MAX_ARRAY_LENGTH as f64).contains(n))
        else {
            return false;
        };

        self.mutate(|list| list.resize(length as usize, Value::Null))
            .is_some()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn wrap_at(&self, index: usize, value: Value) -> Value {
        wrap(&self.state, Some(self.child_path(&index.to_string())), value)
    }

    fn wrap_from<I>(&self, start: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        items
            .into_iter()
            .enumerate()
            .map(|(offset, item)| self.wrap_at(start + offset, item.into()))
            .collect()
    }

    fn mutate<R>(&self, apply: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        let (snapshot, result) = {
            let mut node = self.node.borrow_mut();
            let Data::Array(list) = &mut node.data else {
                return None;
            };
            let snapshot = list.clone();
            let result = apply(list);
            (snapshot, result)
        };

        self.relocate_items();

        let (properties, old_values) = self.index_diff(&snapshot);
        emit(self, self.prefix().as_deref(), &properties, old_values);

        Some(result)
    }

    fn index_diff(&self, snapshot: &[Value]) -> (Vec<String>, Vec<Value>) {
        let current = match &self.node.borrow().data {
            Data::Array(list) => list.clone(),
            Data::Object(_) => Vec::new(),
        };

        let mut properties = Vec::new();
        let mut old_values = Vec::new();

        for (index, old) in snapshot.iter().enumerate() {
            if current.get(index) != Some(old) {
                properties.push(index.to_string());
                old_values.push(old.clone());
            }
        }

        for index in snapshot.len()..current.len() {
            properties.push(index.to_string());
            old_values.push(Value::Null);
        }

        if snapshot.len() != current.len() {
            properties.push("length".to_string());
            old_values.push(Value::from(snapshot.len()));
        }

        (properties, old_values)
    }

    fn relocate_items(&self) {
        let children: Vec<(usize, Store)> = match &self.node.borrow().data {
            Data::Array(list) => list
                .iter()
                .enumerate()
                .filter_map(|(index, item)| item.as_store().map(|s| (index, s.clone())))
                .collect(),
            Data::Object(_) => Vec::new(),
        };

        for (index, child) in children {
            child.relocate(self.child_path(&index.to_string()));
        }
    }
}

fn resolve(range: impl RangeBounds<usize>, length: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&start) => start,
        Bound::Excluded(&start) => start.saturating_add(1),
        Bound::Unbounded => 0,
    }
    .min(length);

    let end = match range.end_bound() {
        Bound::Included(&end) => end.saturating_add(1),
        Bound::Excluded(&end) => end,
        Bound::Unbounded => length,
    }
    .min(length);

    (start, end.max(start))
}

fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{Store, subscribe};
    use crate::value::Value;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn list(data: serde_json::Value) -> (Store, Store) {
        let root = Store::new(json!({ "list": data })).unwrap();
        let list = root.get("list").as_store().cloned().unwrap();
        (root, list)
    }

    #[test]
    fn test_mutator_results() {
        let (_, l) = list(json!([1, 2, 3]));
        l.copy_within(0, 1..);
        assert_eq!(l.to_json(), json!([2.0, 3.0, 3.0]));

        let (_, l) = list(json!([1, 2, 3]));
        l.fill(0, ..);
        assert_eq!(l.to_json(), json!([0.0, 0.0, 0.0]));

        let (_, l) = list(json!([1, 2, 3]));
        assert_eq!(l.pop(), Value::Number(3.0));

        let (_, l) = list(json!([1, 2, 3]));
        assert_eq!(l.push([4]), 4);

        let (_, l) = list(json!([1, 2, 3]));
        l.reverse();
        assert_eq!(l.to_json(), json!([3.0, 2.0, 1.0]));

        let (_, l) = list(json!([1, 2, 3]));
        assert_eq!(l.shift(), Value::Number(1.0));

        let (_, l) = list(json!([1, 2, 3]));
        l.sort_by(|a, b| b.as_f64().partial_cmp(&a.as_f64()).unwrap());
        assert_eq!(l.to_json(), json!([3.0, 2.0, 1.0]));

        let (_, l) = list(json!([1, 2, 3]));
        assert_eq!(l.splice(0, 1, Vec::<Value>::new()), vec![Value::Number(1.0)]);

        let (_, l) = list(json!([1, 2, 3]));
        assert_eq!(l.unshift([0]), 4);
        assert_eq!(l.to_json(), json!([0.0, 1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_default_sort_is_by_string() {
        let (_, l) = list(json!([10, 9, null, 1]));
        l.sort();
        assert_eq!(l.to_json(), json!([1.0, 10.0, 9.0, null]));
    }

    #[test]
    fn test_push_emits_one_batch() {
        let (root, l) = list(json!([1, 2, 3]));
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut subs = Vec::new();

        for key in ["list.3", "list.4", "list.5", "list"] {
            let calls = calls.clone();
            subs.push(
                subscribe(&root, key, move |new, _, origin| {
                    calls
                        .borrow_mut()
                        .push((key, new.clone(), origin.map(str::to_string)));
                })
                .unwrap(),
            );
        }

        assert_eq!(l.push([4, 5, 6]), 6);

        let calls = calls.borrow();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], ("list.3", Value::Number(4.0), Some("list".into())));
        assert_eq!(calls[1], ("list.4", Value::Number(5.0), Some("list".into())));
        assert_eq!(calls[2], ("list.5", Value::Number(6.0), Some("list".into())));
        assert_eq!(calls[3].0, "list");
        assert_eq!(calls[3].2, None);
    }

    #[test]
    fn test_unchanged_indices_are_quiet() {
        let (root, l) = list(json!([1, 2, 3]));
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut subs = Vec::new();
        for key in ["list.0", "list.1", "list.2", "list.length"] {
            let fired = fired.clone();
            subs.push(subscribe(&root, key, move |_, _, _| fired.borrow_mut().push(key)).unwrap());
        }

        l.splice(1, 1, [9]);
        assert_eq!(*fired.borrow(), vec!["list.1"]);

        fired.borrow_mut().clear();
        l.pop();
        assert_eq!(*fired.borrow(), vec!["list.2", "list.length"]);
    }

    #[test]
    fn test_moved_children_follow_their_index() {
        let (root, l) = list(json!([{ "id": 1 }, { "id": 2 }]));
        let second = l.get(1usize).as_store().cloned().unwrap();

        l.reverse();
        assert_eq!(second.prefix().as_deref(), Some("list.0"));

        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        let _sub = subscribe(&root, "list.0.id", move |new, _, _| {
            *sink.borrow_mut() = Some(new.clone());
        })
        .unwrap();

        second.set("id", 20).unwrap();
        assert_eq!(*seen.borrow(), Some(Value::Number(20.0)));
    }

    #[test]
    fn test_inserted_objects_get_destination_paths() {
        let (_, l) = list(json!([1]));
        l.push([json!({ "a": 1 })]);
        l.unshift([json!({ "b": 2 })]);

        let first = l.get(0usize).as_store().cloned().unwrap();
        let last = l.get(2usize).as_store().cloned().unwrap();
        assert_eq!(first.prefix().as_deref(), Some("list.0"));
        assert_eq!(last.prefix().as_deref(), Some("list.2"));
    }

    #[test]
    fn test_object_stores_ignore_mutators() {
        let s = Store::new(json!({ "a": 1 })).unwrap();
        assert_eq!(s.push([1]), 0);
        assert_eq!(s.pop(), Value::Null);
        assert_eq!(s.to_json(), json!({ "a": 1.0 }));
    }
}
