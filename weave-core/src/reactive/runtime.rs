//! Reactive Runtime
//!
//! A [`Reactive`] instance is the coordinator that connects signals and
//! reactions. It owns the dependency graph, the set of pending reactions and
//! the flags that decide when they run.
//!
//! # How It Works
//!
//! 1. When a signal is created, it gets the next index in the instance's
//!    graph.
//!
//! 2. When a reaction runs, the reads it makes are recorded and diffed
//!    against its previous run.
//!
//! 3. When a signal's value changes, the instance:
//!    a. Marks local dependents pending with the signal's measure
//!    b. Records dependents in paired instances for the next cascade
//!    c. Schedules a deferred flush unless a batch, flush or recording is
//!       already going to pick the work up
//!
//! # Locking
//!
//! All graph state sits behind one mutex per instance. It is never held
//! while a reaction body or a listener runs, and at most one instance is
//! locked at a time.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::RuntimeFlavor;

use super::context::{ReactiveContext, Recorded};
use super::pairing::Pairing;
use super::signal::MeasureOfChange;
use super::subscriber::{InstanceId, ReactionId, SignalId, Subscriber};
use crate::config::{AutoFlush, ReactiveConfig};
use crate::graph::{PendingSet, UpdateScheduler};

pub(crate) type ReactionBody = Arc<dyn Fn() + Send + Sync>;

/// Mutable state of an instance.
pub(crate) struct State {
    pub(crate) scheduler: UpdateScheduler,
    pub(crate) bodies: Vec<ReactionBody>,
    pub(crate) pending: PendingSet,
    pub(crate) batch_depth: usize,
    pub(crate) flushing: bool,
    pub(crate) disabled: bool,
    /// A deferred flush has been requested and not yet run.
    pub(crate) auto_scheduled: bool,
    pub(crate) pairing: Pairing,
}

impl State {
    /// Pending reactions here, or paired readers still to cascade into.
    pub(crate) fn has_work(&self) -> bool {
        !self.pending.is_empty() || self.pairing.has_touched()
    }
}

pub(crate) struct ReactiveInner {
    pub(crate) id: InstanceId,
    pub(crate) config: ReactiveConfig,
    pub(crate) state: Mutex<State>,
    pub(crate) this: Weak<ReactiveInner>,
}

/// A reactive instance.
///
/// Handles are cheap to clone; all clones refer to the same graph. Signals
/// and reactions only hold weak references back to their instance.
#[derive(Clone)]
pub struct Reactive {
    pub(crate) inner: Arc<ReactiveInner>,
}

impl Reactive {
    /// Create an instance with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ReactiveConfig::default())
    }

    pub fn with_config(config: ReactiveConfig) -> Self {
        let id = InstanceId::new();
        let inner = Arc::new_cyclic(|this| ReactiveInner {
            id,
            config,
            state: Mutex::new(State {
                scheduler: UpdateScheduler::new(id),
                bodies: Vec::new(),
                pending: PendingSet::new(),
                batch_depth: 0,
                flushing: false,
                disabled: false,
                auto_scheduled: false,
                pairing: Pairing::default(),
            }),
            this: this.clone(),
        });
        tracing::debug!(instance = %id, name = inner.config.label(), "reactive instance created");
        Self { inner }
    }

    pub fn id(&self) -> InstanceId {
        self.inner.id
    }

    pub fn config(&self) -> &ReactiveConfig {
        &self.inner.config
    }

    /// True when nothing is pending and no paired reader waits for a cascade.
    pub fn is_clean(&self) -> bool {
        !self.inner.state.lock().has_work()
    }

    /// Number of reactions waiting to run.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn signal_count(&self) -> usize {
        self.inner.state.lock().scheduler.signal_count()
    }

    pub fn reaction_count(&self) -> usize {
        self.inner.state.lock().scheduler.reaction_count()
    }
}

impl Default for Reactive {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Reactive")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("signals", &state.scheduler.signal_count())
            .field("reactions", &state.scheduler.reaction_count())
            .field("pending", &state.pending.len())
            .field("disabled", &state.disabled)
            .finish()
    }
}

impl ReactiveInner {
    /// Register a reaction body at the next index without running it.
    pub(crate) fn add_reaction(&self, body: ReactionBody) -> ReactionId {
        let mut state = self.state.lock();
        let id = state.scheduler.add_reaction();
        state.bodies.push(body);
        id
    }

    /// Run one reaction and record what it touched.
    pub(crate) fn run_reaction(&self, reaction: ReactionId, measure: MeasureOfChange) {
        let body = self.state.lock().bodies.get(reaction.index()).cloned();
        let Some(body) = body else {
            return;
        };
        tracing::trace!(instance = %self.id, reaction = reaction.index(), ?measure, "running reaction");
        self.run_recorded(reaction, measure, || body());
    }

    /// Run `f` as `reaction`, then replace its dependencies with the reads
    /// `f` made.
    ///
    /// If `f` panics the context is popped and the previous dependencies
    /// stay in place.
    pub(crate) fn run_recorded<R>(
        &self,
        reaction: ReactionId,
        measure: MeasureOfChange,
        f: impl FnOnce() -> R,
    ) -> R {
        let paired = self.state.lock().pairing.source_ids();
        let context = ReactiveContext::enter(
            Subscriber {
                instance: self.id,
                reaction,
            },
            measure,
            paired,
        );
        let output = f();
        let recorded = context.finish();
        self.apply_recorded(reaction, recorded);
        output
    }

    fn apply_recorded(&self, reaction: ReactionId, recorded: Recorded) {
        let diff = self
            .state
            .lock()
            .scheduler
            .record_run(reaction, recorded.dependencies, &recorded.writes);
        if diff.is_empty() {
            return;
        }

        let subscriber = Subscriber {
            instance: self.id,
            reaction,
        };
        for dep in diff.unsubscribe {
            if let Some(source) = self.pairing_source(dep.instance) {
                source.state.lock().scheduler.unsubscribe(dep.signal, subscriber);
            }
        }
        for dep in diff.subscribe {
            if let Some(source) = self.pairing_source(dep.instance) {
                source.state.lock().scheduler.subscribe(dep.signal, subscriber);
            }
        }
    }

    /// Mark everything that read `signal` pending.
    ///
    /// Dependents in paired readers stay recorded here until the cascade at
    /// the end of this instance's flush.
    pub(crate) fn signal_changed(&self, signal: SignalId) {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some((measure, dependents)) = state.scheduler.dependents(signal) else {
                return;
            };
            for subscriber in dependents {
                if subscriber.instance == self.id {
                    state.pending.mark(subscriber.reaction, measure);
                } else {
                    state.pairing.touch(subscriber.instance, subscriber.reaction, measure);
                }
            }
        }

        self.request_flush();
    }

    /// Schedule a deferred flush if nothing else is going to run the
    /// pending work.
    pub(crate) fn request_flush(&self) {
        let wanted = {
            let state = self.state.lock();
            state.batch_depth == 0
                && !state.flushing
                && !state.disabled
                && !state.auto_scheduled
                && state.has_work()
        };
        if wanted && !ReactiveContext::is_recording(self.id) {
            self.schedule_auto_flush();
        }
    }

    fn schedule_auto_flush(&self) {
        if self.config.auto_flush == AutoFlush::Manual {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::trace!(instance = %self.id, "no runtime, waiting for an explicit flush");
            return;
        };
        // A worker thread would run reactions alongside the writer and split
        // one synchronous section across several flushes.
        if handle.runtime_flavor() != RuntimeFlavor::CurrentThread {
            tracing::debug!(
                instance = %self.id,
                "multi-thread runtime, waiting for an explicit flush"
            );
            return;
        }

        self.state.lock().auto_scheduled = true;
        tracing::debug!(instance = %self.id, "auto flush scheduled");
        let this = self.this.clone();
        handle.spawn(async move {
            if let Some(inner) = this.upgrade() {
                inner.run_scheduled();
            }
        });
    }

    fn run_scheduled(&self) {
        let requested = std::mem::take(&mut self.state.lock().auto_scheduled);
        if requested {
            self.run_pending();
        }
    }
}
