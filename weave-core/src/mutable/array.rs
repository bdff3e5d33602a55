//! Array Operations
//!
//! Structural mutators perform the real edit in one step and then record a
//! hand-written patch, so a `splice` shows up as the handful of entries a
//! consumer expects instead of a cascade of index shuffles. Each mutator
//! fires exactly one notification.
//!
//! The read-only combinators never touch `self`; they hand wrapped elements
//! to the callback and return a fresh wrapped array.

use std::cmp::Ordering;

use super::patch::PatchOp;
use super::proxy::{MutableObject, Prop};
use super::value::{Container, Node, Value};

impl MutableObject {
    /// Run `f` against the backing vector, or warn and return `None` when
    /// this object is not an array.
    fn with_items<R>(&self, op: &'static str, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        match &mut *self.node().write() {
            Container::Array(items) => Some(f(items)),
            Container::Object(_) => {
                tracing::warn!(op, "array operation on an object");
                None
            }
        }
    }

    fn derived_array(&self, items: Vec<Value>) -> MutableObject {
        MutableObject::with_counter(Node::array(items), self.make_patch(), self.counter())
    }

    /// Append `value`, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        if !self.is_array() {
            tracing::warn!(op = "push", "array operation on an object");
            return self.len();
        }
        let len = self.len();
        self.set(len, value);
        len + 1
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        if !self.is_array() {
            tracing::warn!(op = "pop", "array operation on an object");
            return None;
        }
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.delete(len - 1)
    }

    /// Remove and return the first element. An empty array is left alone.
    pub fn shift(&self) -> Option<Value> {
        let removed = self
            .with_items("shift", |items| (!items.is_empty()).then(|| items.remove(0)))??;
        self.release(&removed);
        self.record(PatchOp::remove(vec!["0".to_string()]));
        self.changed();
        Some(removed)
    }

    /// Insert `items` at the front, returning the new length.
    pub fn unshift<I, V>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let added: Vec<serde_json::Value> = items.iter().map(Value::to_json).collect();
        let Some(len) = self.with_items("unshift", |current| {
            let tail = std::mem::replace(current, items);
            current.extend(tail);
            current.len()
        }) else {
            return self.len();
        };
        for (i, value) in added.into_iter().enumerate() {
            self.record(PatchOp::add(vec![i.to_string()], value));
        }
        self.adopt_wrapped_children();
        self.changed();
        len
    }

    /// Reverse in place.
    ///
    /// Recorded as moves that pull the last element forward into each
    /// position in turn.
    pub fn reverse(&self) {
        let Some(len) = self.with_items("reverse", |items| {
            items.reverse();
            items.len()
        }) else {
            return;
        };
        let last = len.saturating_sub(1).to_string();
        for i in 0..len.saturating_sub(1) {
            self.record(PatchOp::moved(vec![last.clone()], vec![i.to_string()]));
        }
        self.changed();
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    ///
    /// `start` and `delete_count` are clamped to the array bounds. Returns
    /// the removed elements.
    pub fn splice<I, V>(&self, start: usize, delete_count: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let inserted: Vec<serde_json::Value> = items.iter().map(Value::to_json).collect();
        let Some((start, removed)) = self.with_items("splice", |current| {
            let start = start.min(current.len());
            let end = start + delete_count.min(current.len() - start);
            let removed: Vec<Value> = current.splice(start..end, items).collect();
            (start, removed)
        }) else {
            return Vec::new();
        };

        for value in &removed {
            self.release(value);
        }

        let deleted = removed.len();
        let added = inserted.len();
        let replaced = deleted.min(added);
        for (i, value) in inserted.into_iter().enumerate() {
            let path = vec![(start + i).to_string()];
            if i < replaced {
                self.record(PatchOp::replace(path, value));
            } else {
                self.record(PatchOp::add(path, value));
            }
        }
        for i in added..deleted {
            self.record(PatchOp::remove(vec![(start + i).to_string()]));
        }

        self.adopt_wrapped_children();
        self.changed();
        removed
    }

    /// Sort in place. No patch entries are recorded for a sort.
    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let Some(mut sorted) = self.with_items("sort_by", |items| items.clone()) else {
            return;
        };
        sorted.sort_by(&mut compare);
        self.with_items("sort_by", |items| *items = sorted);
        self.changed();
    }

    /// Map each element into a new wrapped array.
    pub fn map<F, V>(&self, mut f: F) -> MutableObject
    where
        F: FnMut(Prop, usize) -> V,
        V: Into<Value>,
    {
        let out = self
            .elements()
            .into_iter()
            .enumerate()
            .map(|(i, element)| f(element, i).into())
            .collect();
        self.derived_array(out)
    }

    /// Keep the elements for which `keep` returns true.
    pub fn filter<F>(&self, mut keep: F) -> MutableObject
    where
        F: FnMut(&Prop, usize) -> bool,
    {
        let out = self
            .elements()
            .into_iter()
            .enumerate()
            .filter(|(i, element)| keep(element, *i))
            .map(|(_, element)| Value::from(element))
            .collect();
        self.derived_array(out)
    }

    /// Map each element to any number of values and concatenate them.
    pub fn flat_map<F, I, V>(&self, mut f: F) -> MutableObject
    where
        F: FnMut(Prop, usize) -> I,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let out = self
            .elements()
            .into_iter()
            .enumerate()
            .flat_map(|(i, element)| f(element, i).into_iter().map(Into::into))
            .collect();
        self.derived_array(out)
    }

    /// Inline nested arrays up to `depth` levels.
    pub fn flat(&self, depth: usize) -> MutableObject {
        let mut out = Vec::new();
        for element in self.elements() {
            flatten_into(Value::from(element), depth, &mut out);
        }
        self.derived_array(out)
    }

    /// Current elements, containers wrapped. Empty for objects.
    fn elements(&self) -> Vec<Prop> {
        let values = match &*self.node().read() {
            Container::Array(items) => items.clone(),
            Container::Object(_) => {
                tracing::warn!("array combinator on an object");
                Vec::new()
            }
        };
        values.into_iter().map(|v| self.lift(v)).collect()
    }
}

fn flatten_into(value: Value, depth: usize, out: &mut Vec<Value>) {
    let nested = match &value {
        Value::Node(node) if depth > 0 => match &*node.read() {
            Container::Array(items) => Some(items.clone()),
            Container::Object(_) => None,
        },
        _ => None,
    };
    match nested {
        Some(items) => {
            for item in items {
                flatten_into(item, depth - 1, out);
            }
        }
        None => out.push(value),
    }
}
