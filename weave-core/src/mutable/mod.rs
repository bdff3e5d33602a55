//! Mutable Layer
//!
//! Deep observation of plain JSON-like data.
//!
//! # How It Works
//!
//! 1. Data lives in shared [`Node`]s (objects and arrays)
//! 2. [`mutable_object`] wraps a node; the tracking state is stored in the node
//! 3. Every write through the wrapper bumps its revision and notifies listeners
//! 4. Nested containers are wrapped on read and report edits to their parents
//!
//! On top of that sit patch recording ([`PatchOp`]) and structurally shared
//! snapshots ([`Frozen`]).

mod array;
mod freeze;
mod patch;
mod proxy;
mod value;

pub use freeze::Frozen;
pub use patch::{apply_patch, PatchOp, PatchOpKind};
pub use proxy::{mutable_object, Listener, ListenerId, MutableObject, Prop};
pub use value::{Container, Map, Node, PropertyKey, Value};
