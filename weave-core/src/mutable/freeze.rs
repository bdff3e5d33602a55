//! Freeze Engine
//!
//! Produces deeply immutable snapshots of a mutable tree with structural
//! sharing.
//!
//! # How It Works
//!
//! Every wrapped node remembers the last snapshot it produced together with
//! the revision it was taken at. Freezing a node whose revision has not
//! moved returns the remembered snapshot, so an untouched subtree is the
//! very same `Arc` across calls. A mutation bumps the revision of the node
//! and of every ancestor, which rebuilds exactly the path from the root down
//! to the edit while siblings are reused.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Number;

use super::proxy::MutableObject;
use super::value::{Container, Value};

/// An immutable snapshot.
#[derive(Clone, PartialEq)]
pub enum Frozen {
    Null,
    Bool(bool),
    Number(Number),
    String(Arc<str>),
    Array(Arc<[Frozen]>),
    Object(Arc<IndexMap<String, Frozen>>),
}

impl Frozen {
    /// True when both snapshots share storage. Primitives compare by value.
    pub fn ptr_eq(&self, other: &Frozen) -> bool {
        match (self, other) {
            (Frozen::Array(a), Frozen::Array(b)) => Arc::ptr_eq(a, b),
            (Frozen::Object(a), Frozen::Object(b)) => Arc::ptr_eq(a, b),
            (Frozen::String(a), Frozen::String(b)) => Arc::ptr_eq(a, b) || a == b,
            (a, b) => a == b,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Frozen> {
        match self {
            Frozen::Object(map) => map.get(key),
            Frozen::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    pub fn index(&self, index: usize) -> Option<&Frozen> {
        match self {
            Frozen::Array(items) => items.get(index),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frozen::Array(items) => items.len(),
            Frozen::Object(map) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Frozen::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frozen::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Frozen::Null => serde_json::Value::Null,
            Frozen::Bool(b) => serde_json::Value::Bool(*b),
            Frozen::Number(n) => serde_json::Value::Number(n.clone()),
            Frozen::String(s) => serde_json::Value::String(s.to_string()),
            Frozen::Array(items) => serde_json::Value::Array(items.iter().map(Frozen::to_json).collect()),
            Frozen::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl fmt::Debug for Frozen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frozen::Null => f.write_str("null"),
            Frozen::Bool(b) => write!(f, "{b}"),
            Frozen::Number(n) => write!(f, "{n}"),
            Frozen::String(s) => write!(f, "{s:?}"),
            Frozen::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Frozen::Object(map) => f.debug_map().entries(map.iter()).finish(),
        }
    }
}

impl Serialize for Frozen {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Frozen::Null => serializer.serialize_unit(),
            Frozen::Bool(b) => serializer.serialize_bool(*b),
            Frozen::Number(n) => n.serialize(serializer),
            Frozen::String(s) => serializer.serialize_str(s),
            Frozen::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Frozen::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

impl MutableObject {
    /// Immutable snapshot of the current contents.
    pub fn freeze(&self) -> Frozen {
        let revision = self.revision();
        if let Some((taken_at, frozen)) = &self.tracker_guard().frozen {
            if *taken_at == revision {
                return frozen.clone();
            }
        }

        let frozen = match self.node().snapshot() {
            Container::Array(items) => {
                Frozen::Array(items.into_iter().map(|v| self.freeze_value(v)).collect())
            }
            Container::Object(map) => Frozen::Object(Arc::new(
                map.into_iter()
                    .map(|(k, v)| (k, self.freeze_value(v)))
                    .collect(),
            )),
        };

        self.tracker_guard().frozen = Some((revision, frozen.clone()));
        frozen
    }

    fn freeze_value(&self, value: Value) -> Frozen {
        match value {
            Value::Null => Frozen::Null,
            Value::Bool(b) => Frozen::Bool(b),
            Value::Number(n) => Frozen::Number(n),
            Value::String(s) => Frozen::String(s.into()),
            Value::Node(node) => self.adopt(node).freeze(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracked(json: serde_json::Value) -> MutableObject {
        MutableObject::from_json(json, false).unwrap()
    }

    #[test]
    fn unchanged_object_freezes_to_same_snapshot() {
        let m = tracked(json!({"a": {"b": 1}, "c": [1, 2]}));
        let first = m.freeze();
        let second = m.freeze();
        assert!(first.ptr_eq(&second));
        assert_eq!(first.to_json(), m.to_json());
    }

    #[test]
    fn mutation_rebuilds_path_and_reuses_siblings() {
        let m = tracked(json!({"left": {"x": 1}, "right": {"y": 2}}));
        let before = m.freeze();

        let right = m.get("right").unwrap().into_mutable().unwrap();
        right.set("y", 3);
        let after = m.freeze();

        assert!(!before.ptr_eq(&after));
        assert!(before.get("left").unwrap().ptr_eq(after.get("left").unwrap()));
        assert!(!before.get("right").unwrap().ptr_eq(after.get("right").unwrap()));
        assert_eq!(after.get("right").unwrap().get("y").unwrap().as_i64(), Some(3));
    }

    #[test]
    fn moved_elements_keep_identity() {
        let m = tracked(json!([{"id": 1}, {"id": 2}, {"id": 3}]));
        let before = m.freeze();
        m.reverse();
        let after = m.freeze();

        assert!(!before.ptr_eq(&after));
        assert!(before.index(0).unwrap().ptr_eq(after.index(2).unwrap()));
        assert!(before.index(2).unwrap().ptr_eq(after.index(0).unwrap()));
    }

    #[test]
    fn serializes_as_plain_json() {
        let m = tracked(json!({"a": [true, null, "s"]}));
        assert_eq!(
            serde_json::to_value(m.freeze()).unwrap(),
            json!({"a": [true, null, "s"]})
        );
    }
}
