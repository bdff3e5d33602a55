//! Reactive Context
//!
//! The reactive context tracks which reaction is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can record the running reaction as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing reaction.
//! When a reaction runs, its subscriber is pushed onto the stack together
//! with the instances whose signals it may depend on (its own, plus any
//! instance it is paired with). Reads and writes land in the top entry. When
//! the run completes the entry is popped and handed back to the scheduler.
//!
//! The stack supports nesting: a reaction created from inside another
//! reaction records into its own entry.

use std::cell::RefCell;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::signal::MeasureOfChange;
use super::subscriber::{Dependency, InstanceId, SignalId, Subscriber};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    subscriber: Subscriber,
    /// Merged measure of the changes that triggered this run.
    measure: MeasureOfChange,
    /// Instances, besides the owner, whose reads are tracked.
    paired: SmallVec<[InstanceId; 2]>,
    dependencies: IndexSet<Dependency>,
    /// Signals of the owning instance written during the run.
    writes: SmallVec<[SignalId; 4]>,
}

impl ContextEntry {
    fn tracks(&self, instance: InstanceId) -> bool {
        self.subscriber.instance == instance || self.paired.contains(&instance)
    }
}

/// What a reaction touched while it ran.
#[derive(Debug, Default)]
pub struct Recorded {
    pub dependencies: IndexSet<Dependency>,
    pub writes: SmallVec<[SignalId; 4]>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the reaction panics.
pub struct ReactiveContext {
    subscriber: Subscriber,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a new recording context for `subscriber`.
    pub fn enter(
        subscriber: Subscriber,
        measure: MeasureOfChange,
        paired: impl IntoIterator<Item = InstanceId>,
    ) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber,
                measure,
                paired: paired.into_iter().collect(),
                dependencies: IndexSet::new(),
                writes: SmallVec::new(),
            });
        });

        Self {
            subscriber,
            finished: false,
        }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the current subscriber, if any.
    pub fn current_subscriber() -> Option<Subscriber> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.subscriber))
    }

    /// Measure of change of the running reaction.
    pub fn current_measure() -> Option<MeasureOfChange> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.measure))
    }

    /// Whether a reaction of `instance` is running anywhere on this thread.
    pub fn is_recording(instance: InstanceId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| entry.subscriber.instance == instance)
        })
    }

    /// Record a read of `dependency`.
    ///
    /// Reads of instances the running reaction is not paired with are
    /// ignored: they are snapshots, not dependencies.
    pub fn track_read(dependency: Dependency) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.tracks(dependency.instance) {
                    entry.dependencies.insert(dependency);
                }
            }
        });
    }

    /// Record a write to a signal of `instance`.
    ///
    /// Only writes to the running reaction's own instance become producer
    /// edges.
    pub fn track_write(instance: InstanceId, signal: SignalId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.subscriber.instance == instance && !entry.writes.contains(&signal) {
                    entry.writes.push(signal);
                }
            }
        });
    }

    /// Leave the context and return what was recorded.
    pub fn finish(mut self) -> Recorded {
        self.finished = true;
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            match popped {
                Some(entry) => {
                    debug_assert_eq!(
                        entry.subscriber, self.subscriber,
                        "ReactiveContext mismatch: expected {:?}, got {:?}",
                        self.subscriber, entry.subscriber
                    );
                    Recorded {
                        dependencies: entry.dependencies,
                        writes: entry.writes,
                    }
                }
                None => Recorded::default(),
            }
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::ReactionId;

    fn subscriber(instance: InstanceId, index: usize) -> Subscriber {
        Subscriber {
            instance,
            reaction: ReactionId(index),
        }
    }

    #[test]
    fn context_tracks_subscriber() {
        let sub = subscriber(InstanceId::new(), 0);

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(sub, MeasureOfChange::Full, []);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(sub));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn context_records_reads_of_owner_only() {
        let owner = InstanceId::new();
        let other = InstanceId::new();
        let ctx = ReactiveContext::enter(subscriber(owner, 0), MeasureOfChange::Full, []);

        ReactiveContext::track_read(Dependency { instance: owner, signal: SignalId(1) });
        ReactiveContext::track_read(Dependency { instance: owner, signal: SignalId(1) });
        ReactiveContext::track_read(Dependency { instance: other, signal: SignalId(2) });

        let recorded = ctx.finish();
        assert_eq!(recorded.dependencies.len(), 1);
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn paired_instances_are_tracked() {
        let owner = InstanceId::new();
        let source = InstanceId::new();
        let ctx = ReactiveContext::enter(subscriber(owner, 0), MeasureOfChange::Partial, [source]);

        assert_eq!(ReactiveContext::current_measure(), Some(MeasureOfChange::Partial));
        ReactiveContext::track_read(Dependency { instance: source, signal: SignalId(0) });
        ReactiveContext::track_write(source, SignalId(0));
        ReactiveContext::track_write(owner, SignalId(3));

        let recorded = ctx.finish();
        assert_eq!(recorded.dependencies.len(), 1);
        assert_eq!(recorded.writes.as_slice(), &[SignalId(3)]);
    }

    #[test]
    fn nested_contexts() {
        let instance = InstanceId::new();
        let sub1 = subscriber(instance, 0);
        let sub2 = subscriber(instance, 1);

        {
            let _ctx1 = ReactiveContext::enter(sub1, MeasureOfChange::Full, []);
            assert_eq!(ReactiveContext::current_subscriber(), Some(sub1));

            {
                let _ctx2 = ReactiveContext::enter(sub2, MeasureOfChange::Full, []);
                assert_eq!(ReactiveContext::current_subscriber(), Some(sub2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(sub1));
            assert!(ReactiveContext::is_recording(instance));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
        assert!(!ReactiveContext::is_recording(instance));
    }
}
