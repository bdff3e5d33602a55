//! Reactions
//!
//! A reaction is a side-effecting closure that re-runs whenever a signal it
//! read during its last run changes. It runs once on creation to discover
//! its dependencies.

use std::fmt;
use std::sync::{Arc, Weak};

use super::runtime::{Reactive, ReactiveInner};
use super::signal::MeasureOfChange;
use super::subscriber::ReactionId;

/// Handle to a registered reaction.
///
/// Reactions live as long as their instance; dropping the handle does not
/// remove the reaction.
#[derive(Clone)]
pub struct Reaction {
    id: ReactionId,
    owner: Weak<ReactiveInner>,
}

impl Reaction {
    pub fn id(&self) -> ReactionId {
        self.id
    }

    /// How many times the reaction has run, including the initial run.
    pub fn run_count(&self) -> u64 {
        self.with_owner(|owner| {
            owner
                .state
                .lock()
                .scheduler
                .reaction(self.id)
                .map(|node| node.run_count())
        })
        .unwrap_or(0)
    }

    /// Number of signals read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.with_owner(|owner| {
            owner
                .state
                .lock()
                .scheduler
                .reaction(self.id)
                .map(|node| node.dependencies().len())
        })
        .unwrap_or(0)
    }

    pub fn is_pending(&self) -> bool {
        self.with_owner(|owner| Some(owner.state.lock().pending.contains(self.id)))
            .unwrap_or(false)
    }

    fn with_owner<R>(&self, f: impl FnOnce(&ReactiveInner) -> Option<R>) -> Option<R> {
        self.owner.upgrade().and_then(|owner| f(&owner))
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .finish()
    }
}

impl Reactive {
    /// Register `f` as a reaction and run it immediately.
    ///
    /// Writes made by that first run are propagated before this returns,
    /// unless a batch or an enclosing reaction will take care of them.
    pub fn create_reaction<F>(&self, f: F) -> Reaction
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.add_reaction(Arc::new(f));
        self.inner.run_reaction(id, MeasureOfChange::Full);
        self.inner.drain_inline();
        Reaction {
            id,
            owner: Arc::downgrade(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{AutoFlush, ReactiveConfig};
    use crate::reactive::{current_measure_of_change, MeasureOfChange, Reactive};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::{Arc, Mutex};

    fn manual() -> Reactive {
        Reactive::with_config(ReactiveConfig::default().with_auto_flush(AutoFlush::Manual))
    }

    #[test]
    fn reaction_runs_immediately() {
        let rx = manual();
        let ran = Arc::new(AtomicI32::new(0));
        let r = ran.clone();
        let reaction = rx.create_reaction(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(reaction.run_count(), 1);
        assert_eq!(reaction.dependency_count(), 0);
    }

    #[test]
    fn writes_in_first_run_propagate_before_return() {
        let rx = manual();
        let source = rx.create_signal(0);
        let seen = Arc::new(AtomicI32::new(-1));

        let (s, out) = (source.clone(), seen.clone());
        rx.create_reaction(move || {
            out.store(s.get(), Ordering::SeqCst);
        });

        let s = source.clone();
        rx.create_reaction(move || {
            s.set(42);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert!(rx.is_clean());
    }

    #[test]
    fn reaction_sees_merged_measure() {
        let rx = manual();
        let partial = rx.create_signal_with(0, MeasureOfChange::Partial);
        let full = rx.create_signal(0);
        let measures = Arc::new(Mutex::new(Vec::new()));

        let (p, f, m) = (partial.clone(), full.clone(), measures.clone());
        rx.create_reaction(move || {
            p.get();
            f.get();
            m.lock().unwrap().push(current_measure_of_change());
        });

        partial.set(1);
        rx.flush();
        rx.batch_reactions(|| {
            partial.set(2);
            full.set(2);
        });

        assert_eq!(
            *measures.lock().unwrap(),
            vec![MeasureOfChange::Full, MeasureOfChange::Partial, MeasureOfChange::Full]
        );
    }

    #[test]
    fn pending_flag_tracks_scheduling() {
        let rx = manual();
        let a = rx.create_signal(0);
        let a2 = a.clone();
        let reaction = rx.create_reaction(move || {
            a2.get();
        });

        a.set(1);
        assert!(reaction.is_pending());
        rx.flush();
        assert!(!reaction.is_pending());
        assert_eq!(reaction.run_count(), 2);
    }
}
