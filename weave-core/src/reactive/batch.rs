//! Batching and Flushing
//!
//! Writes never run reactions directly; they mark them pending. Pending
//! reactions run in one of four ways:
//!
//! - when the outermost [`Reactive::batch_reactions`] call returns
//! - on an explicit [`Reactive::flush`]
//! - from a deferred task on the ambient current-thread Tokio runtime
//! - while awaiting [`Reactive::to_be_clean`]
//!
//! # Flush Loop
//!
//! 1. Flush paired sources first, so reader reactions see settled values
//! 2. Pick the next ready reaction from the scheduler and run it
//! 3. Repeat while anything is pending, including work the runs created
//! 4. When nothing is left, cascade into paired readers that were touched
//! 5. Go back to 2 if the cascade produced new work here
//!
//! A panicking reaction unwinds out of the loop. The flushing flag is reset
//! on the way out and whatever was still pending stays pending.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexSet;

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveInner};

/// Clears the flushing flag when a flush ends, even by unwinding.
struct FlushGuard<'a>(&'a ReactiveInner);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.state.lock().flushing = false;
    }
}

impl Reactive {
    /// Run `f` with flushing suspended, then run everything it made pending.
    ///
    /// Batches nest; only the outermost one flushes. If `f` panics the
    /// pending reactions still run before the panic is resumed.
    pub fn batch_reactions<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.state.lock().batch_depth += 1;
        let result = panic::catch_unwind(AssertUnwindSafe(f));
        let outermost = {
            let mut state = self.inner.state.lock();
            state.batch_depth -= 1;
            state.batch_depth == 0
        };

        if outermost && !ReactiveContext::is_recording(self.inner.id) {
            match &result {
                Ok(_) => self.inner.run_pending(),
                Err(_) => {
                    if panic::catch_unwind(AssertUnwindSafe(|| self.inner.run_pending())).is_err() {
                        tracing::warn!(instance = %self.inner.id, "reaction panicked while unwinding a batch");
                    }
                }
            }
        }

        match result {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Run pending reactions now.
    pub fn flush(&self) {
        self.inner.run_pending();
    }

    /// Resolve once this instance and every instance reachable through
    /// pairing has no pending work. Disabled instances count as settled.
    pub async fn to_be_clean(&self) {
        loop {
            let group = self.inner.cascade_group();
            for instance in &group {
                instance.run_pending();
            }
            if group.iter().all(|instance| instance.is_settled()) {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Stop running reactions. Writes still update values and mark
    /// reactions pending.
    pub fn disable(&self) {
        self.inner.state.lock().disabled = true;
        tracing::debug!(instance = %self.inner.id, "disabled");
    }

    /// Resume running reactions, running whatever accumulated meanwhile.
    pub fn enable(&self) {
        self.inner.state.lock().disabled = false;
        tracing::debug!(instance = %self.inner.id, "enabled");
        self.inner.run_pending();
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.state.lock().disabled
    }
}

impl ReactiveInner {
    /// Drain the pending set.
    ///
    /// Does nothing while a batch is open, a flush is already running or the
    /// instance is disabled.
    pub(crate) fn run_pending(&self) {
        {
            let mut state = self.state.lock();
            if state.flushing || state.disabled || state.batch_depth > 0 || !state.has_work() {
                return;
            }
            state.flushing = true;
            state.auto_scheduled = false;
        }
        let _guard = FlushGuard(self);
        tracing::debug!(instance = %self.id, name = self.config.label(), "flush started");
        // A source that cascades back here while we are flushing only
        // leaves its marks in our pending set.
        self.settle_sources();

        let mut runs = 0usize;
        loop {
            let next = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                state
                    .scheduler
                    .next_ready(&state.pending)
                    .and_then(|reaction| state.pending.take(reaction).map(|m| (reaction, m)))
            };

            if let Some((reaction, measure)) = next {
                self.run_reaction(reaction, measure);
                runs += 1;
                if runs >= self.config.max_flush_iterations && self.state.lock().has_work() {
                    tracing::error!(
                        instance = %self.id,
                        runs,
                        "flush exceeded its iteration limit, leaving reactions pending"
                    );
                    break;
                }
                continue;
            }

            if !self.cascade_touched() {
                break;
            }
        }

        tracing::debug!(instance = %self.id, runs, "flush finished");
    }

    /// Run the pending work of a create call unless an enclosing run will.
    pub(crate) fn drain_inline(&self) {
        if ReactiveContext::is_recording(self.id) {
            return;
        }
        self.run_pending();
        self.request_flush();
    }

    fn is_settled(&self) -> bool {
        let state = self.state.lock();
        state.disabled || (!state.flushing && !state.has_work())
    }

    /// This instance and every instance reachable through pairing edges.
    pub(crate) fn cascade_group(&self) -> Vec<Arc<ReactiveInner>> {
        let Some(this) = self.this.upgrade() else {
            return Vec::new();
        };
        let mut seen = IndexSet::from([self.id]);
        let mut group = vec![Arc::clone(&this)];
        let mut queue = VecDeque::from([this]);

        while let Some(current) = queue.pop_front() {
            let peers = current.state.lock().pairing.peers();
            for peer in peers {
                if seen.insert(peer.id) {
                    group.push(Arc::clone(&peer));
                    queue.push_back(peer);
                }
            }
        }
        group
    }
}
