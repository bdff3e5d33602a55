//! Weave Core
//!
//! This crate provides the state engine behind the Weave UI framework.
//! It implements:
//!
//! - Reactive primitives (signals, derived signals, reactions)
//! - Dependency-ordered, batched scheduling with glitch-free updates
//! - Pairing between independently owned reactive instances
//! - Deep mutation tracking for plain objects and arrays
//! - JSON Patch generation and structurally shared snapshots
//! - A wire format that keeps revisions across a transport boundary
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `revision`: Change stamps and the comparison rule signals use
//! - `mutable`: Observable wrappers over shared object and array nodes
//! - `reactive`: Signals, reactions, batching and pairing
//! - `graph`: Per-instance dependency graph and flush ordering
//! - `serializer`: JSON and MessagePack encoding of mutable trees
//! - `config`: Instance configuration
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use weave_core::reactive::Reactive;
//!
//! let rx = Reactive::new();
//! let count = rx.create_signal(1);
//!
//! let c = count.clone();
//! let doubled = rx.create_derived(move || c.get() * 2);
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let (d, out) = (doubled.clone(), log.clone());
//! rx.create_reaction(move || out.lock().unwrap().push(d.get()));
//!
//! rx.batch_reactions(|| count.set(5));
//! assert_eq!(*log.lock().unwrap(), vec![2, 10]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod mutable;
pub mod reactive;
pub mod revision;
pub mod serializer;

pub use config::{AutoFlush, ReactiveConfig};
pub use error::{Error, Result};
pub use mutable::{apply_patch, mutable_object, Frozen, MutableObject, Node, PatchOp, Prop, Value};
pub use reactive::{current_measure_of_change, MeasureOfChange, Reaction, Reactive, Signal};
pub use revision::{check_modified, get_revision, touch_revision, Revision, RevisionCounter};
pub use serializer::{deserialize, from_msgpack, serialize, to_msgpack};
