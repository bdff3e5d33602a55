//! Mutable Object
//!
//! A [`MutableObject`] is the observable wrapper around one [`Node`]. All
//! mutation goes through it: every write bumps the object's revision,
//! notifies its listeners and, when patch recording is enabled, queues a
//! JSON Patch entry describing the edit.
//!
//! # Identity
//!
//! Tracking state lives inside the node, so wrapping is idempotent: wrapping
//! the same node twice yields handles to the same object, with the same
//! revision, listeners and patch queue.
//!
//! # Deep notification
//!
//! Nested containers are wrapped lazily when they are read through their
//! parent. The parent then registers one listener on the child that bumps
//! the parent's revision and re-notifies, so a mutation at any depth reaches
//! every ancestor exactly once. Replacing or deleting a child detaches that
//! listener.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};

use super::freeze::Frozen;
use super::patch::PatchOp;
use super::value::{Node, NodeInner, PropertyKey, Value};
use crate::error::Result;
use crate::revision::{Revision, RevisionCounter, Trackable};

/// Callback fired after a mutation.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Key identifying a registered listener.
///
/// Registering a second listener under the same key replaces the first,
/// which is how fan-out stays de-duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracking state stored in a wrapped node.
pub(crate) struct Tracker {
    /// Key this object registers under when it listens to its children.
    key: ListenerId,
    revision: Revision,
    counter: Arc<RevisionCounter>,
    make_patch: bool,
    listeners: IndexMap<ListenerId, Listener>,
    patch: Vec<PatchOp>,
    /// Children this object is listening to, by node address.
    attached: HashMap<usize, Weak<NodeInner>>,
    pub(crate) frozen: Option<(Revision, Frozen)>,
}

impl Tracker {
    fn new(counter: Arc<RevisionCounter>, make_patch: bool) -> Self {
        Self {
            key: ListenerId::new(),
            revision: counter.next(),
            counter,
            make_patch,
            listeners: IndexMap::new(),
            patch: Vec::new(),
            attached: HashMap::new(),
            frozen: None,
        }
    }
}

/// Wrap `original` so its mutations are observable.
///
/// With `make_json_patch` the object records a JSON Patch entry for every
/// edit; drain them with [`MutableObject::take_patch`].
pub fn mutable_object(original: Node, make_json_patch: bool) -> MutableObject {
    MutableObject::new(original, make_json_patch)
}

/// Observable handle to a node.
#[derive(Clone)]
pub struct MutableObject {
    node: Node,
}

impl MutableObject {
    /// Wrap a node using the shared revision counter.
    pub fn new(original: Node, make_patch: bool) -> Self {
        Self::with_counter(original, make_patch, RevisionCounter::shared())
    }

    /// Wrap a node using an explicit revision counter.
    ///
    /// If the node is already wrapped the existing tracking state is kept,
    /// including its counter and patch mode.
    pub fn with_counter(original: Node, make_patch: bool, counter: Arc<RevisionCounter>) -> Self {
        original
            .0
            .tracker
            .get_or_init(|| Mutex::new(Tracker::new(counter, make_patch)));
        Self { node: original }
    }

    /// Build and wrap a node tree from JSON.
    pub fn from_json(json: serde_json::Value, make_patch: bool) -> Result<Self> {
        Ok(Self::new(Node::from_json(json)?, make_patch))
    }

    /// The wrapper of `node`, if it has been wrapped before.
    pub fn existing(node: &Node) -> Option<Self> {
        node.0.tracker.get().map(|_| Self { node: node.clone() })
    }

    fn tracker(&self) -> MutexGuard<'_, Tracker> {
        self.node
            .0
            .tracker
            .get_or_init(|| Mutex::new(Tracker::new(RevisionCounter::shared(), false)))
            .lock()
    }

    pub(crate) fn tracker_guard(&self) -> MutexGuard<'_, Tracker> {
        self.tracker()
    }

    pub fn is_mutable(&self) -> bool {
        true
    }

    pub fn revision(&self) -> Revision {
        self.tracker().revision
    }

    /// Seed the revision, e.g. with one produced by another process.
    pub fn set_revision(&self, revision: Revision) {
        let mut tracker = self.tracker();
        tracker.counter.observe(revision);
        tracker.revision = revision;
    }

    /// Assign the next revision without notifying.
    pub(crate) fn touch(&self) -> Revision {
        let mut tracker = self.tracker();
        tracker.revision = tracker.counter.next();
        tracker.revision
    }

    pub fn make_patch(&self) -> bool {
        self.tracker().make_patch
    }

    pub(crate) fn counter(&self) -> Arc<RevisionCounter> {
        Arc::clone(&self.tracker().counter)
    }

    /// Register a listener fired after every mutation of this object or any
    /// wrapped descendant.
    pub fn add_mutable_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.listen(id, Arc::new(listener));
        id
    }

    /// Register `listener` under `id`, replacing any listener with that key.
    pub fn listen(&self, id: ListenerId, listener: Listener) {
        self.tracker().listeners.insert(id, listener);
    }

    pub fn remove_mutable_listener(&self, id: ListenerId) -> bool {
        self.tracker().listeners.shift_remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.tracker().listeners.len()
    }

    /// The wrapped node.
    pub fn original(&self) -> Node {
        self.node.clone()
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Replace the whole contents with those of `original`.
    ///
    /// Records a root-level `replace` when patch recording is on.
    pub fn set_original(&self, original: Node) {
        let contents = original.snapshot();
        let previous = std::mem::replace(&mut *self.node.write(), contents);
        for (_, child) in previous.child_nodes() {
            self.detach(&child);
        }
        self.adopt_wrapped_children();
        if self.make_patch() {
            self.record(PatchOp::replace(Vec::new(), self.node.to_json()));
        }
        self.changed();
    }

    pub fn ptr_eq(&self, other: &MutableObject) -> bool {
        self.node.ptr_eq(&other.node)
    }

    pub fn is_array(&self) -> bool {
        self.node.is_array()
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.node.read().keys()
    }

    pub fn contains_key(&self, key: impl Into<PropertyKey>) -> bool {
        self.node.read().get(&key.into()).is_some()
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.node.to_json()
    }

    /// Read a property.
    ///
    /// Nested objects and arrays come back wrapped, attached to this object
    /// so their mutations propagate upwards.
    pub fn get(&self, key: impl Into<PropertyKey>) -> Option<Prop> {
        let value = self.node.read().get(&key.into()).cloned()?;
        Some(self.lift(value))
    }

    /// Write a property.
    ///
    /// Wrapped values are stored as their underlying node. Array keys past
    /// the end extend the array.
    pub fn set(&self, key: impl Into<PropertyKey>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let written = self.node.write().put(&key, value.clone());
        let Some((segment, previous)) = written else {
            tracing::warn!(%key, "ignoring non-index key on array");
            return;
        };
        if self.make_patch() {
            let op = if previous.is_some() {
                PatchOp::replace(vec![segment], value.to_json())
            } else {
                PatchOp::add(vec![segment], value.to_json())
            };
            self.record(op);
        }
        if let Some(previous) = previous {
            if previous != value {
                self.release(&previous);
            }
        }
        if let Some(child) = value.as_node().and_then(MutableObject::existing) {
            self.attach(&child);
        }
        self.changed();
    }

    /// Delete a property, returning the removed value.
    ///
    /// Deleting an array index removes the element and shifts the tail.
    /// Missing keys are left alone and nothing is notified.
    pub fn delete(&self, key: impl Into<PropertyKey>) -> Option<Value> {
        let (segment, removed) = self.node.write().take(&key.into())?;
        self.release(&removed);
        self.record(PatchOp::remove(vec![segment]));
        self.changed();
        Some(removed)
    }

    /// Drain queued patch entries: this object's first, then each wrapped
    /// descendant's, prefixed with the key it currently lives under.
    pub fn take_patch(&self) -> Vec<PatchOp> {
        let mut ops = std::mem::take(&mut self.tracker().patch);
        let children = self.node.read().child_nodes();
        for (key, child) in children {
            if let Some(child) = MutableObject::existing(&child) {
                ops.extend(child.take_patch().into_iter().map(|op| op.prefixed(&key)));
            }
        }
        ops
    }

    /// Queue a patch entry if recording is on.
    pub(crate) fn record(&self, op: PatchOp) {
        let mut tracker = self.tracker();
        if tracker.make_patch {
            tracker.patch.push(op);
        }
    }

    /// Bump the revision and notify listeners.
    pub(crate) fn changed(&self) {
        let listeners: Vec<Listener> = {
            let mut tracker = self.tracker();
            tracker.revision = tracker.counter.next();
            tracker.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener();
        }
    }

    /// Present a stored value to callers, wrapping containers.
    pub(crate) fn lift(&self, value: Value) -> Prop {
        match value {
            Value::Node(node) => Prop::Mutable(self.adopt(node)),
            other => Prop::Value(other),
        }
    }

    /// Wrap a child node with this object's settings and listen to it.
    pub(crate) fn adopt(&self, node: Node) -> MutableObject {
        let (counter, make_patch) = {
            let tracker = self.tracker();
            (Arc::clone(&tracker.counter), tracker.make_patch)
        };
        let child = MutableObject::with_counter(node, make_patch, counter);
        self.attach(&child);
        child
    }

    /// Listen to every nested container that is already wrapped.
    pub(crate) fn adopt_wrapped_children(&self) {
        let children = self.node.read().child_nodes();
        for (_, child) in children {
            if let Some(child) = MutableObject::existing(&child) {
                self.attach(&child);
            }
        }
    }

    fn attach(&self, child: &MutableObject) {
        let parent_key = {
            let mut tracker = self.tracker();
            let addr = child.node.addr();
            let live = tracker
                .attached
                .get(&addr)
                .and_then(Weak::upgrade)
                .is_some_and(|inner| Arc::ptr_eq(&inner, &child.node.0));
            if live {
                return;
            }
            tracker.attached.insert(addr, Arc::downgrade(&child.node.0));
            tracker.key
        };
        let parent = Arc::downgrade(&self.node.0);
        child.listen(
            parent_key,
            Arc::new(move || {
                if let Some(inner) = parent.upgrade() {
                    MutableObject { node: Node(inner) }.changed();
                }
            }),
        );
    }

    /// Stop listening to `child` unless it is still stored here.
    pub(crate) fn detach(&self, child: &Node) {
        if self.node.read().contains_node(child) {
            return;
        }
        let Some(child) = MutableObject::existing(child) else {
            return;
        };
        let parent_key = {
            let mut tracker = self.tracker();
            if tracker.attached.remove(&child.node.addr()).is_none() {
                return;
            }
            tracker.key
        };
        child.remove_mutable_listener(parent_key);
    }

    /// Detach a value that was removed from this object.
    pub(crate) fn release(&self, value: &Value) {
        if let Value::Node(node) = value {
            self.detach(node);
        }
    }
}

impl PartialEq for MutableObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for MutableObject {}

impl fmt::Debug for MutableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableObject")
            .field("revision", &self.revision())
            .field("data", &self.node)
            .finish()
    }
}

impl Trackable for MutableObject {
    fn mutable(&self) -> Option<MutableObject> {
        Some(self.clone())
    }
}

impl From<MutableObject> for Value {
    fn from(mutable: MutableObject) -> Self {
        Value::Node(mutable.node)
    }
}

impl From<&MutableObject> for Value {
    fn from(mutable: &MutableObject) -> Self {
        Value::Node(mutable.node.clone())
    }
}

/// A property read through a [`MutableObject`].
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    /// A primitive, or a container that is not wrapped.
    Value(Value),
    /// A wrapped container.
    Mutable(MutableObject),
}

impl Prop {
    pub fn as_mutable(&self) -> Option<&MutableObject> {
        match self {
            Prop::Mutable(m) => Some(m),
            Prop::Value(_) => None,
        }
    }

    pub fn into_mutable(self) -> Option<MutableObject> {
        match self {
            Prop::Mutable(m) => Some(m),
            Prop::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Prop::Value(v) => Some(v),
            Prop::Mutable(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Prop::Value(v) => v.to_json(),
            Prop::Mutable(m) => m.to_json(),
        }
    }
}

impl From<Prop> for Value {
    fn from(prop: Prop) -> Self {
        match prop {
            Prop::Value(v) => v,
            Prop::Mutable(m) => m.into(),
        }
    }
}

impl Trackable for Prop {
    fn mutable(&self) -> Option<MutableObject> {
        match self {
            Prop::Mutable(m) => Some(m.clone()),
            Prop::Value(v) => v.mutable(),
        }
    }
}
