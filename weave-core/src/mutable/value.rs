//! Plain Data Model
//!
//! The mutable layer observes plain JSON-like data. Primitives are values;
//! objects and arrays are shared [`Node`]s with reference semantics, so the
//! same container can be reached from several places and keeps its identity
//! when it moves. Equality between two nodes is identity, never structure.

use std::fmt;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Number;

use super::proxy::{MutableObject, Tracker};
use crate::error::{Error, Result};
use crate::revision::Trackable;

/// Insertion-ordered property map backing an object node.
pub type Map = IndexMap<String, Value>;

/// A dynamically typed plain value.
#[derive(Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// An object or array, shared by reference.
    Node(Node),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Deep copy into a detached `serde_json` tree.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Node(node) => node.to_json(),
        }
    }

    /// Deep copy with fresh, unwrapped containers.
    pub fn deep_clone(&self) -> Value {
        Value::from(self.to_json())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Node(node) => node.fmt(f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Node(node) => node.serialize(serializer),
        }
    }
}

impl Trackable for Value {
    fn mutable(&self) -> Option<MutableObject> {
        self.as_node().and_then(MutableObject::existing)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Node(Node::array(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => Value::Node(Node::object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Value::Number(Number::from(n))
            }
        })*
    };
}

number_from!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Node(Node::array(items))
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Node(Node::object(map))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Property key: object property names or array indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Name(String),
    Index(usize),
}

impl PropertyKey {
    /// Interpret the key as an array index.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            PropertyKey::Name(name) => name.parse().ok(),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Name(name) => f.write_str(name),
            PropertyKey::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        PropertyKey::Name(name.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(name: String) -> Self {
        PropertyKey::Name(name)
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        PropertyKey::Index(index)
    }
}

/// Contents of a node.
#[derive(Debug, Clone)]
pub enum Container {
    Array(Vec<Value>),
    Object(Map),
}

impl Container {
    pub fn len(&self) -> usize {
        match self {
            Container::Array(items) => items.len(),
            Container::Object(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &PropertyKey) -> Option<&Value> {
        match self {
            Container::Array(items) => key.as_index().and_then(|i| items.get(i)),
            Container::Object(map) => map.get(key.to_string().as_str()),
        }
    }

    /// Current keys, array indices rendered as strings.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Container::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            Container::Object(map) => map.keys().cloned().collect(),
        }
    }

    /// Store `value` under `key`.
    ///
    /// Returns the path segment written and the value it replaced, or `None`
    /// when `key` is not a valid array index. Writing past the end of an
    /// array pads the gap with nulls.
    pub(crate) fn put(&mut self, key: &PropertyKey, value: Value) -> Option<(String, Option<Value>)> {
        match self {
            Container::Object(map) => {
                let name = key.to_string();
                let previous = map.insert(name.clone(), value);
                Some((name, previous))
            }
            Container::Array(items) => {
                let index = key.as_index()?;
                if index < items.len() {
                    let previous = std::mem::replace(&mut items[index], value);
                    Some((index.to_string(), Some(previous)))
                } else {
                    items.resize(index, Value::Null);
                    items.push(value);
                    Some((index.to_string(), None))
                }
            }
        }
    }

    /// Remove the entry under `key`, shifting array elements down.
    pub(crate) fn take(&mut self, key: &PropertyKey) -> Option<(String, Value)> {
        match self {
            Container::Object(map) => {
                let name = key.to_string();
                map.shift_remove(&name).map(|value| (name, value))
            }
            Container::Array(items) => {
                let index = key.as_index().filter(|i| *i < items.len())?;
                Some((index.to_string(), items.remove(index)))
            }
        }
    }

    /// Nested containers together with the key they currently live under.
    pub(crate) fn child_nodes(&self) -> Vec<(String, Node)> {
        match self {
            Container::Array(items) => items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.as_node().map(|n| (i.to_string(), n.clone())))
                .collect(),
            Container::Object(map) => map
                .iter()
                .filter_map(|(k, v)| v.as_node().map(|n| (k.clone(), n.clone())))
                .collect(),
        }
    }

    pub(crate) fn contains_node(&self, node: &Node) -> bool {
        let mut values: Box<dyn Iterator<Item = &Value>> = match self {
            Container::Array(items) => Box::new(items.iter()),
            Container::Object(map) => Box::new(map.values()),
        };
        values.any(|v| v.as_node().is_some_and(|n| n.ptr_eq(node)))
    }
}

pub(crate) struct NodeInner {
    pub(crate) data: RwLock<Container>,
    /// Tracking state, present once the node has been wrapped.
    pub(crate) tracker: OnceLock<Mutex<Tracker>>,
}

/// A shared object or array.
#[derive(Clone)]
pub struct Node(pub(crate) Arc<NodeInner>);

impl Node {
    pub fn new(container: Container) -> Self {
        Self(Arc::new(NodeInner {
            data: RwLock::new(container),
            tracker: OnceLock::new(),
        }))
    }

    pub fn object(map: Map) -> Self {
        Self::new(Container::Object(map))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::new(Container::Array(items))
    }

    /// Build a node tree from JSON. The top-level value must be an object
    /// or an array.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match Value::from(json) {
            Value::Node(node) => Ok(node),
            _ => Err(Error::NotContainer),
        }
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_array(&self) -> bool {
        matches!(*self.read(), Container::Array(_))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Read a property without wrapping it.
    pub fn get(&self, key: impl Into<PropertyKey>) -> Option<Value> {
        self.read().get(&key.into()).cloned()
    }

    /// Shallow copy of the current contents.
    pub fn snapshot(&self) -> Container {
        self.read().clone()
    }

    pub fn to_json(&self) -> serde_json::Value {
        match &*self.read() {
            Container::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Container::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Container> {
        self.0.data.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Container> {
        self.0.data.write()
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.read() {
            Container::Array(items) => f.debug_list().entries(items).finish(),
            Container::Object(map) => f.debug_map().entries(map).finish(),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &*self.read() {
            Container::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Container::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}
