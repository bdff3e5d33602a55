//! Identifiers for the reactive graph.
//!
//! Signals and reactions are addressed by their creation-order index inside
//! the instance that owns them. Edges that cross instance boundaries (through
//! pairing) carry the instance id as well.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a reactive instance.
///
/// Uses an atomic counter to ensure uniqueness across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Creation-order index of a signal within its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub(crate) usize);

impl SignalId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Creation-order index of a reaction within its instance.
///
/// Lower indices run first when nothing else decides the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReactionId(pub(crate) usize);

impl ReactionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A reaction that depends on some signal, possibly in another instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscriber {
    pub instance: InstanceId,
    pub reaction: ReactionId,
}

/// A signal read by some reaction, possibly in another instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub instance: InstanceId,
    pub signal: SignalId,
}
