//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tells its owning instance when that value changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a reaction runs, the read is recorded in
//!    the reactive context. The scheduler turns it into an edge once the run
//!    completes.
//!
//! 2. When a signal is written, the new value is compared with the stored
//!    one. Plain values compare with `PartialEq`; mutable objects compare by
//!    revision.
//!
//! 3. On an actual change the owner marks every dependent reaction pending.
//!
//! # Deep Changes
//!
//! A signal holding a [`MutableObject`] listens to it. Editing the object
//! anywhere below the root counts as a change of the signal, exactly as if
//! it had been set.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveInner};
use super::subscriber::{Dependency, InstanceId, SignalId};
use crate::mutable::{ListenerId, MutableObject};
use crate::revision::{check_modified, get_revision, Revision, Revisioned, Trackable};

/// How strongly a change affects dependents.
///
/// A reaction triggered by several signals sees the strongest measure among
/// them; `Full` dominates `Partial`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MeasureOfChange {
    Partial,
    #[default]
    Full,
}

impl MeasureOfChange {
    pub fn merge(self, other: MeasureOfChange) -> MeasureOfChange {
        self.max(other)
    }
}

/// Values a signal can hold.
pub trait SignalValue: Trackable + Clone + PartialEq + Send + Sync + 'static {}

impl<T> SignalValue for T where T: Trackable + Clone + PartialEq + Send + Sync + 'static {}

/// Storage shared by all handles of one signal.
struct SignalCell<T> {
    current: RwLock<Revisioned<T>>,
    /// Key of the listener installed on a held mutable value.
    listener: ListenerId,
    watched: Mutex<Option<MutableObject>>,
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use weave_core::reactive::Reactive;
///
/// let rx = Reactive::new();
/// let count = rx.create_signal(0);
///
/// assert_eq!(count.get(), 0);
/// count.set(5);
/// assert_eq!(count.get_untracked(), 5);
/// ```
pub struct Signal<T: SignalValue> {
    id: SignalId,
    owner_id: InstanceId,
    owner: Weak<ReactiveInner>,
    cell: Arc<SignalCell<T>>,
}

impl<T: SignalValue> Signal<T> {
    pub(crate) fn new(id: SignalId, owner: &Arc<ReactiveInner>, value: T) -> Self {
        let signal = Self {
            id,
            owner_id: owner.id,
            owner: Arc::downgrade(owner),
            cell: Arc::new(SignalCell {
                current: RwLock::new(get_revision(&value)),
                listener: ListenerId::new(),
                watched: Mutex::new(None),
            }),
        };
        signal.watch(value.mutable());
        signal
    }

    /// Index of this signal within its instance.
    pub fn id(&self) -> SignalId {
        self.id
    }

    /// Id of the owning instance.
    pub fn owner_id(&self) -> InstanceId {
        self.owner_id
    }

    /// The owning instance, if it is still alive.
    pub fn owner(&self) -> Option<Reactive> {
        self.owner.upgrade().map(|inner| Reactive { inner })
    }

    /// Get the current value.
    ///
    /// If a reaction of the owning instance, or of an instance paired with
    /// it, is running, the read becomes one of its dependencies.
    pub fn get(&self) -> T {
        ReactiveContext::track_read(Dependency {
            instance: self.owner_id,
            signal: self.id,
        });
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.cell.current.read().value.clone()
    }

    /// Run `f` on a snapshot of the current value. Tracked like `get`.
    ///
    /// No lock is held while `f` runs, so `f` may write this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        ReactiveContext::track_read(Dependency {
            instance: self.owner_id,
            signal: self.id,
        });
        let current = self.cell.current.read().value.clone();
        f(&current)
    }

    /// Revision captured with the current value, `None` for plain values.
    pub fn revision(&self) -> Option<Revision> {
        self.cell.current.read().rev_num
    }

    /// Set a new value.
    ///
    /// Dependents are scheduled only when the value actually changed.
    pub fn set(&self, value: T) {
        ReactiveContext::track_write(self.owner_id, self.id);

        let modified = check_modified(&value, Some(&*self.cell.current.read()));
        if !modified {
            return;
        }

        let mutable = value.mutable();
        *self.cell.current.write() = get_revision(&value);
        self.watch(mutable);

        if let Some(owner) = self.owner.upgrade() {
            owner.signal_changed(self.id);
        }
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.get_untracked());
        self.set(next);
    }

    /// Number of reactions currently depending on this signal.
    pub fn subscriber_count(&self) -> usize {
        self.owner
            .upgrade()
            .and_then(|owner| {
                owner
                    .state
                    .lock()
                    .scheduler
                    .signal(self.id)
                    .map(|node| node.dependents().len())
            })
            .unwrap_or(0)
    }

    /// Move the deep-change listener to `next`.
    fn watch(&self, next: Option<MutableObject>) {
        let mut watched = self.cell.watched.lock();
        if let (Some(current), Some(next)) = (watched.as_ref(), next.as_ref()) {
            if current.ptr_eq(next) {
                return;
            }
        }
        if let Some(previous) = watched.take() {
            previous.remove_mutable_listener(self.cell.listener);
        }
        let Some(next) = next else {
            return;
        };

        let cell = Arc::downgrade(&self.cell);
        let owner = self.owner.clone();
        let owner_id = self.owner_id;
        let id = self.id;
        next.listen(
            self.cell.listener,
            Arc::new(move || {
                let Some(cell) = cell.upgrade() else {
                    return;
                };
                {
                    let mut current = cell.current.write();
                    current.rev_num = current.value.revision();
                }
                ReactiveContext::track_write(owner_id, id);
                if let Some(owner) = owner.upgrade() {
                    owner.signal_changed(id);
                }
            }),
        );
        *watched = Some(next);
    }
}

impl<T: SignalValue> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            owner_id: self.owner_id,
            owner: self.owner.clone(),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: SignalValue + fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("owner", &self.owner_id)
            .field("value", &self.cell.current.read().value)
            .finish()
    }
}

impl Reactive {
    /// Create a signal tagged with [`MeasureOfChange::Full`].
    pub fn create_signal<T: SignalValue>(&self, value: T) -> Signal<T> {
        self.create_signal_with(value, MeasureOfChange::Full)
    }

    /// Create a signal whose changes carry `measure`.
    pub fn create_signal_with<T: SignalValue>(&self, value: T, measure: MeasureOfChange) -> Signal<T> {
        let id = self.inner.state.lock().scheduler.add_signal(measure);
        Signal::new(id, &self.inner, value)
    }
}
