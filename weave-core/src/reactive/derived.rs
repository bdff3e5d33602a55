//! Derived Signals
//!
//! A derived signal is a signal written by a reaction that evaluates a
//! getter. Because the reaction is registered as the signal's producer, the
//! scheduler always re-evaluates it before any reaction that reads the
//! signal, so consumers never observe a stale derived value.

use std::sync::Arc;

use super::runtime::Reactive;
use super::signal::{MeasureOfChange, Signal, SignalValue};

impl Reactive {
    /// Create a signal that follows `f`.
    pub fn create_derived<T, F>(&self, f: F) -> Signal<T>
    where
        T: SignalValue,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.create_derived_with(f, MeasureOfChange::Full)
    }

    /// Create a signal that follows `f`, tagging its changes with `measure`.
    pub fn create_derived_with<T, F>(&self, f: F, measure: MeasureOfChange) -> Signal<T>
    where
        T: SignalValue,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let compute = Arc::new(f);
        let reaction = self.inner.add_reaction(Arc::new(|| {}));
        let initial = self
            .inner
            .run_recorded(reaction, MeasureOfChange::Full, || compute());
        let signal = self.create_signal_with(initial, measure);

        {
            let mut state = self.inner.state.lock();
            state.scheduler.add_writer(signal.id(), reaction);
            let target = signal.clone();
            if let Some(body) = state.bodies.get_mut(reaction.index()) {
                *body = Arc::new(move || target.set(compute()));
            }
        }

        self.inner.drain_inline();
        signal
    }
}
