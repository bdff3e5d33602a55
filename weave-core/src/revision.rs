//! Revision Tracking
//!
//! A revision is a monotonic change counter attached to every mutable value.
//! Revisions carry no ordering semantics beyond "different means changed":
//! they let a signal hold either plain values (compared with `PartialEq`) or
//! mutable objects (compared by revision) interchangeably.
//!
//! The counter is an injectable service. [`RevisionCounter::shared`] is the
//! process-wide default; mutable objects created from one another always
//! share the counter of their root so revisions stay comparable.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::mutable::MutableObject;

/// A change stamp handed out by a [`RevisionCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    /// Build a revision from its raw value (used by the deserializer).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Monotonic revision source.
#[derive(Debug)]
pub struct RevisionCounter {
    next: AtomicU64,
}

impl RevisionCounter {
    /// Create an independent counter.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// The default counter shared by every mutable object that was not
    /// given one explicitly.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<RevisionCounter>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(RevisionCounter::new())))
    }

    /// Hand out the next revision.
    pub fn next(&self) -> Revision {
        Revision(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Make sure revisions handed out later never collide with `seen`.
    ///
    /// Called when a revision produced elsewhere is seeded into a local
    /// object, e.g. after deserialization.
    pub fn observe(&self, seen: Revision) {
        self.next.fetch_max(seen.0 + 1, Ordering::Relaxed);
    }
}

impl Default for RevisionCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// How a value exposes its mutable wrapper, if it has one.
///
/// Plain types keep the default implementation. Types that may hold a
/// [`MutableObject`] return it so signals can compare by revision and listen
/// for deep edits.
pub trait Trackable {
    /// The mutable object behind this value, if any.
    fn mutable(&self) -> Option<MutableObject> {
        None
    }

    /// Current revision, or `None` for plain values.
    fn revision(&self) -> Option<Revision> {
        self.mutable().map(|m| m.revision())
    }
}

macro_rules! plain_trackable {
    ($($ty:ty),* $(,)?) => {
        $(impl Trackable for $ty {})*
    };
}

plain_trackable!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, &'static str, serde_json::Value,
);

impl<T: Trackable> Trackable for Option<T> {
    fn mutable(&self) -> Option<MutableObject> {
        self.as_ref().and_then(Trackable::mutable)
    }
}

impl<T> Trackable for Vec<T> {}

impl<T: Trackable> Trackable for Arc<T> {
    fn mutable(&self) -> Option<MutableObject> {
        T::mutable(self)
    }
}

/// A value paired with the revision it had when it was captured.
#[derive(Debug, Clone, PartialEq)]
pub struct Revisioned<T> {
    pub value: T,
    /// `None` for plain values.
    pub rev_num: Option<Revision>,
}

/// Capture `value` together with its current revision.
pub fn get_revision<T: Trackable + Clone>(value: &T) -> Revisioned<T> {
    Revisioned {
        value: value.clone(),
        rev_num: value.revision(),
    }
}

/// Assign the next revision to `value` if it is mutable.
pub fn touch_revision<T: Trackable>(value: &T) -> Option<Revision> {
    value.mutable().map(|m| m.touch())
}

/// Decide whether `new` differs from a previously captured value.
///
/// Without a previous capture the value always counts as modified. Plain
/// captures compare with `PartialEq`; mutable captures compare revisions.
pub fn check_modified<T: Trackable + PartialEq>(new: &T, old: Option<&Revisioned<T>>) -> bool {
    match old {
        None => true,
        Some(Revisioned { value, rev_num: None }) => new != value,
        Some(Revisioned { rev_num, .. }) => new.revision() != *rev_num,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::{mutable_object, Node};

    #[test]
    fn counter_is_monotonic() {
        let counter = RevisionCounter::new();
        let a = counter.next();
        let b = counter.next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn observe_skips_past_seeded_revision() {
        let counter = RevisionCounter::new();
        counter.observe(Revision::from_raw(500));
        assert_eq!(counter.next().raw(), 501);

        // Observing an older revision never moves the counter back.
        counter.observe(Revision::from_raw(3));
        assert_eq!(counter.next().raw(), 502);
    }

    #[test]
    fn plain_values_have_no_revision() {
        let captured = get_revision(&42);
        assert_eq!(captured.rev_num, None);
        assert_eq!(touch_revision(&42), None);
    }

    #[test]
    fn plain_values_compare_by_equality() {
        let old = get_revision(&String::from("a"));
        assert!(!check_modified(&String::from("a"), Some(&old)));
        assert!(check_modified(&String::from("b"), Some(&old)));
        assert!(check_modified(&String::from("a"), None));
    }

    #[test]
    fn mutable_values_compare_by_revision() {
        let obj = mutable_object(Node::object(Default::default()), false);
        let old = get_revision(&obj);
        assert!(old.rev_num.is_some());
        assert!(!check_modified(&obj, Some(&old)));

        obj.set("a", 1);
        assert!(check_modified(&obj, Some(&old)));
    }

    #[test]
    fn touch_assigns_new_revision() {
        let obj = mutable_object(Node::array(Vec::new()), false);
        let before = obj.revision();
        let touched = touch_revision(&obj).unwrap();
        assert_ne!(before, touched);
        assert_eq!(obj.revision(), touched);
    }
}
